use std::path::PathBuf;

#[derive(Debug, Default)]
struct CliArgs {
    folder: Option<PathBuf>,
    volume: Option<u8>,
    null_audio: bool,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1).collect())?;
    let _log_guard = juke::logging::init()?;

    juke::app::run_with_startup(juke::app::AppStartupOptions {
        folder: args.folder,
        volume: args.volume,
        null_audio: args.null_audio,
    })
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--dir" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--dir requires a folder path");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--dir cannot be empty");
                }
                out.folder = Some(PathBuf::from(value));
            }
            "--volume" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--volume requires a value");
                };
                out.volume = Some(
                    value
                        .parse()
                        .map_err(|_| anyhow::anyhow!("--volume expects a number from 0 to 128"))?,
                );
            }
            "--null-audio" => out.null_audio = true,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("Juke");
    println!("  --dir <path>      Folder to load at startup");
    println!("  --volume <0-128>  Startup volume");
    println!("  --null-audio      Run without opening an audio device");
}
