use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use varstream::MetadataMode;
use varstream_tools::{bit_dump, demo_registry, run_demo, Beacon};

#[derive(Parser)]
#[command(
    name = "varstream-tools",
    version,
    about = "varstream demo and inspection tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the demo exchange under one metadata mode and print sizes.
    Demo {
        /// Metadata mode for the session.
        #[arg(long, value_enum, default_value_t = ModeArg::Full)]
        metadata: ModeArg,
        /// Also print a bit-level dump of the first message.
        #[arg(long)]
        dump: bool,
    },
    /// Compare message sizes across all three metadata modes.
    Modes,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    None,
    Hash,
    Full,
}

impl From<ModeArg> for MetadataMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::None => Self::None,
            ModeArg::Hash => Self::Hash,
            ModeArg::Full => Self::Full,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Demo { metadata, dump } => {
            let report = run_demo(metadata.into())?;
            println!("mode:            {:?}", report.mode);
            println!("first message:   {} bytes", report.first_message_bytes);
            println!("second message:  {} bytes", report.second_message_bytes);
            println!("successor delta: {} bytes", report.delta_message_bytes);
            if dump {
                let registry = demo_registry()?;
                let mut encoder = varstream::Encoder::new(registry, metadata.into());
                encoder.write_object(Some(&Beacon {
                    label: "north".to_owned(),
                    level: 3,
                }))?;
                let message = encoder.finish_message();
                println!("\nbeacon message ({} bytes):", message.len());
                print!("{}", bit_dump(&message, 64));
            }
        }
        Command::Modes => {
            println!("{:<6} {:>8} {:>8} {:>8}", "mode", "first", "second", "delta");
            for mode in [MetadataMode::None, MetadataMode::Hash, MetadataMode::Full] {
                let report = run_demo(mode)?;
                println!(
                    "{:<6} {:>8} {:>8} {:>8}",
                    format!("{:?}", report.mode).to_lowercase(),
                    report.first_message_bytes,
                    report.second_message_bytes,
                    report.delta_message_bytes
                );
            }
        }
    }
    Ok(())
}
