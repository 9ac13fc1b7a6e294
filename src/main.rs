use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;

use kontrast::capture::capture_test_keys;
use kontrast::config;
use kontrast::device::{AdbChannel, AdbDevice, AdbStatus, DeviceChannel};
use kontrast::diff::{DiffOutcome, diff_images};
use kontrast::layout::RunLayout;
use kontrast::render::{Manifest, RenderOptions, render_on_devices};
use kontrast::verify::verify;

/// Kontrast - render UI on Android devices and diff it against golden keys
#[derive(Parser, Debug)]
#[command(
    name = "kontrast",
    version,
    about = "On-device UI render capture and pixel-diff verification over adb",
    after_help = "ENVIRONMENT VARIABLES:\n\
        KONTRAST_ADB               adb executable (legacy: ADB)\n\
        KONTRAST_OUTPUT_DIR        Root for per-device render output\n\
        KONTRAST_KEY_DIR           Root of the golden key images\n\
        KONTRAST_TEST_RUNNER       Instrumentation runner class\n\
        KONTRAST_ANNOTATION        Annotation selecting render tests\n\
        KONTRAST_INSTALL_TIMEOUT   Bound on one package install (seconds)\n\
        KONTRAST_LOGCAT            Capture device logs while rendering\n\
        KONTRAST_JOBS              Worker threads used for diffing\n\
        RUST_LOG                   Log filter, overrides --log-level"
)]
struct Args {
    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// adb executable
    #[arg(long, global = true)]
    adb: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List attached devices
    Devices,

    /// Run the render tests on every online device and pull their output
    Render {
        /// Package holding the instrumentation, e.g. com.example.app.test
        #[arg(short = 'p', long)]
        test_package: String,

        /// Restrict to these device serials (default: all online devices)
        #[arg(short, long)]
        device: Vec<String>,

        /// Output root (default: KONTRAST_OUTPUT_DIR)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Instrumentation runner class
        #[arg(long)]
        runner: Option<String>,

        /// Annotation selecting render tests
        #[arg(long)]
        annotation: Option<String>,

        /// Do not capture logcat
        #[arg(long)]
        no_logcat: bool,

        /// Application package installed before the run
        #[arg(long)]
        app_apk: Option<PathBuf>,

        /// Test package installed before the run
        #[arg(long)]
        test_apk: Option<PathBuf>,
    },

    /// Record a device's last render pass as the golden key set
    CaptureKey {
        /// Serial of the device whose output becomes the keys
        #[arg(short, long)]
        device: String,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Golden root (default: KONTRAST_KEY_DIR)
        #[arg(short, long)]
        key_dir: Option<PathBuf>,
    },

    /// Compare a device's last render pass with the golden key set
    Verify {
        #[arg(short, long)]
        device: String,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long)]
        key_dir: Option<PathBuf>,

        /// Worker threads (default: KONTRAST_JOBS)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diff two PNG files
    Diff {
        golden: PathBuf,
        candidate: PathBuf,
        /// Where the difference image is written
        #[arg(short, long, default_value = "diff.png")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let config = config::get();
    let mut adb = AdbChannel::from_config(config);
    if let Some(path) = args.adb {
        adb.executable = path;
    }

    match args.command {
        Commands::Devices => {
            for device in adb.devices()? {
                let kind = if device.is_emulator() { "emulator" } else { "device" };
                println!("{}\t{:?}\t{}", device.id, device.status, kind);
            }
        }

        Commands::Render {
            test_package,
            device,
            output,
            runner,
            annotation,
            no_logcat,
            app_apk,
            test_apk,
        } => {
            let mut options = RenderOptions::from_config(test_package, config);
            if let Some(runner) = runner {
                options = options.test_runner(runner);
            }
            if let Some(annotation) = annotation {
                options = options.annotation(annotation);
            }
            if no_logcat {
                options = options.capture_logcat(false);
            }
            if let Some(apk) = app_apk {
                options = options.app_apk(apk);
            }
            if let Some(apk) = test_apk {
                options = options.test_apk(apk);
            }

            let mut devices = adb.devices()?;
            if !device.is_empty() {
                for id in &device {
                    if !devices.iter().any(|d| &d.id == id) {
                        tracing::warn!("device {} is not attached", id);
                    }
                }
                devices.retain(|d| device.contains(&d.id));
            }
            if !devices.iter().any(AdbDevice::is_online) {
                return Err("no online devices".into());
            }

            let layout = RunLayout::new(output.unwrap_or_else(|| config.paths.output_dir.clone()));
            let runs = render_on_devices(&adb, &devices, &layout, &options);

            let mut failures = 0;
            for run in &runs {
                match &run.result {
                    Ok(render) => {
                        let failed = render.manifest.failed_keys();
                        println!(
                            "{}: {} cases -> {}",
                            run.device.id,
                            render.manifest.outputs.len(),
                            render.manifest_path.display()
                        );
                        for key in &failed {
                            println!("  render failed: {}", key);
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        eprintln!("{}: {}", run.device.id, e);
                    }
                }
            }
            if failures > 0 {
                return Err(format!("{} of {} devices failed", failures, runs.len()).into());
            }
        }

        Commands::CaptureKey {
            device,
            output,
            key_dir,
        } => {
            let layout = RunLayout::new(output.unwrap_or_else(|| config.paths.output_dir.clone()));
            let device = AdbDevice::new(device, AdbStatus::Online);
            let manifest = Manifest::read(&layout.manifest_path(&device))?;
            let key_dir = key_dir.unwrap_or_else(|| config.paths.key_dir.clone());

            let copied = capture_test_keys(&manifest, &key_dir)?;
            println!(
                "Captured {} cases ({} files) into {}",
                manifest.outputs.len(),
                copied,
                key_dir.display()
            );
        }

        Commands::Verify {
            device,
            output,
            key_dir,
            jobs,
            json,
        } => {
            let layout = RunLayout::new(output.unwrap_or_else(|| config.paths.output_dir.clone()));
            let device = AdbDevice::new(device, AdbStatus::Online);
            let manifest = Manifest::read(&layout.manifest_path(&device))?;
            let key_dir = key_dir.unwrap_or_else(|| config.paths.key_dir.clone());

            let report = verify(&manifest, &key_dir, jobs.unwrap_or(config.jobs))?;
            let report_path = layout.verification_path(&device);
            report.write(&report_path)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for case in &report.cases {
                    println!("{:<60} {:?}", case.name, case.outcome);
                }
                println!("\n{}", report.summary());
                println!("Report: {}", report_path.display());
            }

            if !report.is_success() {
                return Err("verification failed".into());
            }
        }

        Commands::Diff {
            golden,
            candidate,
            output,
        } => match diff_images(&golden, &candidate, &output)? {
            DiffOutcome::Compared(report) => {
                println!(
                    "{}x{}: {} of {} pixels differ ({})",
                    report.width,
                    report.height,
                    report.mismatched,
                    report.total,
                    report.percent()
                );
                println!("Diff image: {}", output.display());
                if !report.is_match() {
                    return Err("images differ".into());
                }
            }
            DiffOutcome::Missing {
                golden_missing,
                candidate_missing,
            } => {
                if golden_missing {
                    eprintln!("missing: {}", golden.display());
                }
                if candidate_missing {
                    eprintln!("missing: {}", candidate.display());
                }
                return Err("nothing to compare".into());
            }
        },
    }

    Ok(())
}
