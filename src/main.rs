use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use yarisc_emu::ui;
use yarisc_emu::yarisc::{Debugger, ExecutionMode, FeatureLevel, Machine, FEATURE_LEVEL_LATEST};

#[derive(Parser, Debug)]
#[command(name = "yarisc-emu")]
#[command(about = "Emulator and interactive debugger for the YaRISC 16-bit processor")]
struct Args {
    /// Image file loaded into main memory at address zero
    image: Option<PathBuf>,

    /// Feature level of the emulated machine (min or v1)
    #[arg(long, default_value_t = FEATURE_LEVEL_LATEST)]
    level: FeatureLevel,

    /// Disable strict execution (reserved-bit audit, alignment and bounds checks)
    #[arg(long)]
    no_strict: bool,

    /// Run to halt without the interactive debugger
    #[arg(long)]
    unattended: bool,
}

fn load_image(machine: &mut Machine, args: &Args) -> anyhow::Result<()> {
    if let Some(image) = &args.image {
        machine
            .load_image(image)
            .with_context(|| format!("loading {}", image.display()))?;

        log::info!("loaded image {}", image.display());
    }

    Ok(())
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let mode = if args.no_strict {
        ExecutionMode::Normal
    } else {
        ExecutionMode::Strict
    };

    if args.unattended {
        let mut machine = Machine::new(args.level);
        load_image(&mut machine, args)?;

        Ok(machine.execute(mode)?)
    } else {
        let debugger = Debugger::handle();
        let mut machine = Machine::with_debugger(debugger.clone(), args.level);
        load_image(&mut machine, args)?;

        ui::console::run(&mut machine, &debugger, mode)
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("A breakpoint was hit");
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}
