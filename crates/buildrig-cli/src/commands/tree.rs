// `buildrig tree`: show the process tree a teardown would kill

use clap::Args;

use buildrig_process::tree::{self, ProcessTable, SystemProcessTable};

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Root process ID
    pub pid: u32,

    /// Print a JSON array instead of one pid per line
    #[arg(long)]
    pub json: bool,

    /// Read /proc directly instead of the platform process API (Linux only)
    #[arg(long)]
    pub procfs: bool,
}

fn table(procfs: bool) -> anyhow::Result<Box<dyn ProcessTable>> {
    if !procfs {
        return Ok(Box::new(SystemProcessTable));
    }
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(tree::ProcfsProcessTable::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("--procfs is only available on Linux")
    }
}

pub fn execute(args: TreeArgs) -> anyhow::Result<i32> {
    let table = table(args.procfs)?;
    let pids = tree::collect(table.as_ref(), args.pid)?;

    if args.json {
        println!("{}", serde_json::to_string(&pids)?);
    } else {
        for pid in pids {
            println!("{}", pid);
        }
    }
    Ok(0)
}
