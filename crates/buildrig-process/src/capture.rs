//! Stream capture tasks

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::handle::{ProcessHandle, Stream};
use crate::sink::LogSink;

const CHUNK_SIZE: usize = 8 * 1024;

/// Where captured chunks are echoed besides the handle's buffers
#[derive(Clone)]
pub(crate) struct Mirror {
    /// Echo stdout lines, tagged with `prefix`
    pub debug: bool,
    pub prefix: String,
    /// Echo stderr verbatim
    pub stderr: bool,
    pub stdout_to: Arc<dyn LogSink>,
    pub stderr_to: Arc<dyn LogSink>,
}

/// Split a stdout chunk into tagged lines, dropping blank ones
pub fn tag_lines(prefix: &str, chunk: &str) -> Vec<String> {
    chunk
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("{}{}", prefix, line))
        .collect()
}

/// Reassembles lines split across reads before tagging them
#[derive(Debug)]
pub(crate) struct LineTagger {
    prefix: String,
    partial: Vec<u8>,
}

impl LineTagger {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            partial: Vec::new(),
        }
    }

    /// Tagged lines completed by `chunk`; the unterminated tail is held back
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);
        let Some(end) = self.partial.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.partial.drain(..=end).collect();
        tag_lines(&self.prefix, &String::from_utf8_lossy(&complete))
    }

    /// Whatever is left once the stream ends
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.partial);
        tag_lines(&self.prefix, &String::from_utf8_lossy(&rest))
    }
}

/// Start draining `reader` into the handle, the sink and the mirror
///
/// The task never applies backpressure to the child: every chunk is copied
/// into memory as soon as it is read.
pub(crate) fn spawn_reader<R>(
    mut reader: R,
    stream: Stream,
    handle: ProcessHandle,
    sink: Arc<dyn LogSink>,
    mirror: Mirror,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tagger = (stream == Stream::Stdout && mirror.debug)
            .then(|| LineTagger::new(&mirror.prefix));
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(pid = handle.pid(), ?stream, error = %e, "Output stream read failed");
                    break;
                }
            };
            let chunk = &buf[..n];
            trace!(pid = handle.pid(), ?stream, bytes = n, "Captured chunk");

            handle.append(stream, chunk);
            if let Err(e) = sink.append(chunk) {
                warn!(pid = handle.pid(), error = %e, "Failed to append to output log");
            }

            if let Some(tagger) = tagger.as_mut() {
                echo_lines(mirror.stdout_to.as_ref(), tagger.push(chunk));
            } else if stream == Stream::Stderr && mirror.stderr {
                let _ = mirror.stderr_to.append(chunk);
            }
        }
        if let Some(tagger) = tagger.as_mut() {
            echo_lines(mirror.stdout_to.as_ref(), tagger.finish());
        }
    })
}

fn echo_lines(to: &dyn LogSink, lines: Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let mut out = String::new();
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    let _ = to.append(out.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemoryLogSink, NullLogSink};
    use std::collections::HashMap;

    fn quiet_mirror() -> Mirror {
        Mirror {
            debug: false,
            prefix: String::new(),
            stderr: false,
            stdout_to: Arc::new(NullLogSink),
            stderr_to: Arc::new(NullLogSink),
        }
    }

    #[test]
    fn test_tag_lines_prefixes_and_drops_blanks() {
        let lines = tag_lines("EP: ", "listening on 3000\n\n   \r\nready\r\n");
        assert_eq!(lines, vec!["EP: listening on 3000", "EP: ready"]);
    }

    #[test]
    fn test_tag_lines_whitespace_only_chunk() {
        assert!(tag_lines("EP: ", " \n\t\n").is_empty());
    }

    #[test]
    fn test_line_split_across_reads_is_tagged_once() {
        let mut tagger = LineTagger::new("EP: ");
        assert!(tagger.push(b"hel").is_empty());
        assert_eq!(tagger.push(b"lo\nwor"), vec!["EP: hello"]);
        assert!(tagger.push(b"ld").is_empty());
        assert_eq!(tagger.finish(), vec!["EP: world"]);
        assert!(tagger.finish().is_empty());
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let mut tagger = LineTagger::new("> ");
        let bytes = "héllo\n".as_bytes();
        assert!(tagger.push(&bytes[..2]).is_empty());
        assert_eq!(tagger.push(&bytes[2..]), vec!["> héllo"]);
    }

    #[tokio::test]
    async fn test_reader_fills_buffer_and_sink() {
        let handle = ProcessHandle::new(1, "cat".into(), vec![], HashMap::new());
        let sink = Arc::new(MemoryLogSink::new());
        let input: &[u8] = b"line one\nline two\n";

        spawn_reader(input, Stream::Stdout, handle.clone(), sink.clone(), quiet_mirror())
            .await
            .unwrap();

        assert_eq!(handle.stdout_text(), "line one\nline two\n");
        assert_eq!(sink.contents(), "line one\nline two\n");
        assert!(handle.stderr_text().is_empty());
    }

    #[tokio::test]
    async fn test_debug_mirror_tags_whole_lines() {
        let handle = ProcessHandle::new(1, "node".into(), vec![], HashMap::new());
        let echoed = Arc::new(MemoryLogSink::new());
        let mirror = Mirror {
            debug: true,
            prefix: "EP: ".to_string(),
            stdout_to: echoed.clone(),
            ..quiet_mirror()
        };
        let input = (&b"hel"[..]).chain(&b"lo\n\nworld"[..]);

        spawn_reader(input, Stream::Stdout, handle.clone(), Arc::new(NullLogSink), mirror)
            .await
            .unwrap();

        assert_eq!(echoed.contents(), "EP: hello\nEP: world\n");
        assert_eq!(handle.stdout_text(), "hello\n\nworld");
    }

    #[tokio::test]
    async fn test_stderr_mirror_is_verbatim() {
        let handle = ProcessHandle::new(1, "node".into(), vec![], HashMap::new());
        let echoed = Arc::new(MemoryLogSink::new());
        let mirror = Mirror {
            debug: true,
            prefix: "EP: ".to_string(),
            stderr: true,
            stderr_to: echoed.clone(),
            ..quiet_mirror()
        };
        let input: &[u8] = b"boom\n\n";

        spawn_reader(input, Stream::Stderr, handle, Arc::new(NullLogSink), mirror)
            .await
            .unwrap();

        assert_eq!(echoed.contents(), "boom\n\n");
    }
}
