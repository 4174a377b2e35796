use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{env, path::PathBuf, process::Command};

use crate::config::{DaemonConfigState, Profile};
use crate::ipc::{self, FrameSource};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon(input_source(&mut pargs)?);
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("run") => ipc::run_daemon(input_source(&mut pargs)?),

        Some("start") => {
            let input: String = pargs
                .value_from_str("--input")
                .map_err(|_| anyhow!("usage: posectl start --input <path>"))?;
            let exe = std::env::current_exe()?;
            let child = Command::new(exe)
                .args(["--daemon", "--input", &input])
                .spawn()?;
            println!("posectl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => {
            let r = ipc::client_request(serde_json::json!({"op":"shutdown"}))?;
            print_response(&r);
            Ok(())
        }

        Some("status") => {
            let r = ipc::client_request(serde_json::json!({"op":"status"}))?;
            print_response(&r);
            Ok(())
        }

        Some("reload") => {
            let r = ipc::client_request(serde_json::json!({"op":"reload"}))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: posectl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("list") => {
            let r = ipc::client_request(serde_json::json!({"op":"list"}))?;
            print_response(&r);
            Ok(())
        }

        Some("replay") => {
            let profile_name: Option<String> = pargs.opt_value_from_str("--profile")?;
            let path: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: posectl replay <frames.jsonl> [--profile <name>]"))?;
            let profile = replay_profile(profile_name.as_deref())?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let stats = ipc::replay(&FrameSource::File(PathBuf::from(path)), profile, &mut out)?;
            eprintln!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn input_source(pargs: &mut Arguments) -> Result<FrameSource> {
    let input: Option<String> = pargs.opt_value_from_str("--input")?;
    Ok(match input.as_deref() {
        None | Some("-") => FrameSource::Stdin,
        Some(p) => FrameSource::File(PathBuf::from(p)),
    })
}

fn replay_profile(name: Option<&str>) -> Result<Profile> {
    let cfg = DaemonConfigState::load_or_install_default()?;
    match name {
        Some(n) => Profile::load(&cfg.profile_path(n)),
        None => Ok(cfg.profile),
    }
}

fn print_help() {
    println!(
        r#"posectl — pose gesture daemon

USAGE:
  posectl help [command]                  Show general or command-specific help
  posectl run [--input <path>]            Run the daemon in the foreground
  posectl start --input <path>            Start the daemon in the background
  posectl stop                            Stop the daemon
  posectl status                          Show daemon and pipeline state
  posectl reload                          Reload active profile
  posectl use <name>                      Switch active profile
  posectl list                            List profiles
  posectl replay <file> [--profile <n>]   Run a recorded frame file offline

FRAMES:
  One JSON object per line:
    {{"timestamp": 1.5, "width": 640, "height": 480,
     "landmarks": {{"nose": [0.5, 0.3], "left_wrist": [0.6, 0.8], ...}}}}
  "landmarks": null marks a tick with no person in view.

TIPS:
  - Profiles: ~/.config/posectl/profiles
  - Active profile pointer: ~/.config/posectl/active
  - Gestures are written to stdout as JSON lines; logs go to stderr (RUST_LOG)
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: posectl run [--input <path>]\nReads frames from <path> (default stdin) and serves the control socket."
        ),
        "start" => println!(
            "usage: posectl start --input <path>\nStarts the daemon in the background reading frames from <path>, e.g. a FIFO."
        ),
        "stop" => println!("usage: posectl stop\nStops the running daemon."),
        "status" => println!(
            "usage: posectl status\nShows active profile, frame source, counters and the last gesture."
        ),
        "reload" => println!(
            "usage: posectl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: posectl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => {
            println!("usage: posectl list\nLists available profiles and the active one.")
        }
        "replay" => println!(
            "usage: posectl replay <file> [--profile <name>]\nRuns recorded frames through a fresh engine; prints gestures, then a summary on stderr."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
