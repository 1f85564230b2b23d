use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use emu_core::logging::{LogCategory, LogConfig, LogLevel};
use emu_core::System;
use emu_loopy::{ControllerType, LoopyConfig, LoopySystem, PrintJob};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Controller {
    Auto,
    Pad,
    Mouse,
}

impl From<Controller> for ControllerType {
    fn from(c: Controller) -> Self {
        match c {
            Controller::Auto => ControllerType::Auto,
            Controller::Pad => ControllerType::Pad,
            Controller::Mouse => ControllerType::Mouse,
        }
    }
}

/// Headless Casio Loopy runner
#[derive(Parser, Debug)]
struct Args {
    /// BIOS image
    #[arg(long)]
    bios: PathBuf,

    /// Cartridge ROM
    #[arg(long)]
    rom: PathBuf,

    /// JSON console configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Enter the cartridge directly instead of booting the BIOS
    #[arg(long, default_value_t = false)]
    skip_bios: bool,

    /// Stop on the first CPU fault or unimplemented hardware path
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Persist cartridge SRAM here
    #[arg(long)]
    sram: Option<PathBuf>,

    #[arg(long, value_enum)]
    controller: Option<Controller>,

    /// Write the final save-state here instead of stdout
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write captured print jobs here as JSON
    #[arg(long)]
    print_jobs: Option<PathBuf>,

    /// Level for every emulator log category (off, error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Per-category levels
    #[arg(long)]
    log_cpu: Option<String>,
    #[arg(long)]
    log_bus: Option<String>,
    #[arg(long)]
    log_vdp: Option<String>,
    #[arg(long)]
    log_dma: Option<String>,
    #[arg(long)]
    log_serial: Option<String>,
    #[arg(long)]
    log_timers: Option<String>,
    #[arg(long)]
    log_interrupts: Option<String>,
    #[arg(long)]
    log_sound: Option<String>,
    #[arg(long)]
    log_printer: Option<String>,
    #[arg(long)]
    log_stubs: Option<String>,

    /// Send emulator logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn category_levels(&self) -> [(LogCategory, &Option<String>); 10] {
        [
            (LogCategory::CPU, &self.log_cpu),
            (LogCategory::Bus, &self.log_bus),
            (LogCategory::VDP, &self.log_vdp),
            (LogCategory::DMA, &self.log_dma),
            (LogCategory::Serial, &self.log_serial),
            (LogCategory::Timers, &self.log_timers),
            (LogCategory::Interrupts, &self.log_interrupts),
            (LogCategory::Sound, &self.log_sound),
            (LogCategory::Printer, &self.log_printer),
            (LogCategory::Stubs, &self.log_stubs),
        ]
    }
}

fn parse_level(s: &str) -> Result<LogLevel> {
    LogLevel::from_str(s).ok_or_else(|| anyhow!("Unknown log level: {}", s))
}

fn configure_logging(args: &Args) -> Result<()> {
    let log_config = LogConfig::global();
    if let Some(level) = args.log_level.as_deref() {
        log_config.set_global_level(parse_level(level)?);
    }
    for (category, level) in args.category_levels() {
        if let Some(level) = level.as_deref() {
            log_config.set_level(category, parse_level(level)?);
        }
    }
    if let Some(path) = args.log_file.as_ref() {
        log_config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<LoopyConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => LoopyConfig::default(),
    };

    if args.skip_bios {
        config.skip_bios = true;
    }
    if args.strict {
        config.strict = true;
    }
    if let Some(sram) = args.sram.as_ref() {
        config.sram_path = Some(sram.clone());
    }
    if let Some(controller) = args.controller {
        config.controller = controller.into();
    }
    Ok(config)
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let mut f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write!(f, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;

    let config = load_config(&args)?;
    let bios = fs::read(&args.bios)
        .with_context(|| format!("reading BIOS {}", args.bios.display()))?;
    let rom = fs::read(&args.rom)
        .with_context(|| format!("reading ROM {}", args.rom.display()))?;

    let mut sys = LoopySystem::new(config);
    sys.mount("BIOS", &bios)?;
    sys.mount("Cartridge", &rom)?;

    let mut jobs: Vec<PrintJob> = Vec::new();
    for fnum in 1..=args.frames {
        let frame = sys
            .step_frame()
            .with_context(|| format!("frame {}", fnum))?;
        if fnum % 60 == 0 {
            log::info!("frame {} ({}x{})", fnum, frame.width, frame.height);
        }
        for job in sys.take_print_jobs() {
            log::info!("print job {}x{} at frame {}", job.width, job.height, fnum);
            jobs.push(job);
        }
    }

    if let Some(path) = args.print_jobs.as_ref() {
        write_json(path, &serde_json::to_value(&jobs)?)?;
    }

    let state = sys.save_state();
    match args.save.as_ref() {
        Some(path) => write_json(path, &state)?,
        None => println!("{}", serde_json::to_string_pretty(&state)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["emu_cli", "--bios", "bios.bin", "--rom", "game.bin"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.frames, 60);
        assert_eq!(load_config(&args).unwrap(), LoopyConfig::default());
    }

    #[test]
    fn test_flag_overrides() {
        let args = parse(&["--skip-bios", "--strict", "--controller", "mouse", "--sram", "s.sav"]);
        let config = load_config(&args).unwrap();
        assert!(config.skip_bios);
        assert!(config.strict);
        assert_eq!(config.controller, ControllerType::Mouse);
        assert_eq!(config.sram_path, Some(PathBuf::from("s.sav")));
    }

    #[test]
    fn test_rom_is_required() {
        assert!(Args::try_parse_from(["emu_cli", "--bios", "bios.bin"]).is_err());
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(parse_level("warn").unwrap(), LogLevel::Warn);
        assert!(parse_level("loud").is_err());
        let args = parse(&["--log-dma", "trace"]);
        let levels = args.category_levels();
        assert_eq!(levels[3].0, LogCategory::DMA);
        assert_eq!(levels[3].1.as_deref(), Some("trace"));
    }
}
