//! `pcmstream` - plays and records headerless raw PCM audio.

use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use pcm_stream::device::alsa::{AlsaDevice, DeviceRequest};
use pcm_stream::pipeline;
use pcm_stream::{
    event_callback, AccessMode, CaptureFileSeries, Direction, FormatPreset, InteractiveControl,
    MeterMode, MeterStyle, NamePolicy, PeakMeter, PositionMonitor, SampleFormat, SessionFlags,
    SessionOptions, StreamError, StreamEvent, StreamSession, TransferLimit, TransferMethod,
};

#[derive(Parser, Debug)]
#[command(name = "pcmstream")]
#[command(about = "Plays and records headerless raw PCM audio", version)]
struct Cli {
    /// Record from the device instead of playing to it
    #[arg(short = 'C', long)]
    capture: bool,

    /// Play to the device (the default)
    #[arg(short = 'P', long, conflicts_with = "capture")]
    playback: bool,

    /// Select PCM by name
    #[arg(short = 'D', long, default_value = "default")]
    device: String,

    /// Quiet mode
    #[arg(short, long)]
    quiet: bool,

    /// Sample format (case insensitive) or shorthand preset: cd, cdr, dat
    #[arg(short = 'f', long)]
    format: Option<String>,

    /// Channel count
    #[arg(short = 'c', long)]
    channels: Option<usize>,

    /// Frame rate in Hz (values below 1000 are treated as kHz)
    #[arg(short = 'r', long)]
    rate: Option<u32>,

    /// Interrupt after this many seconds
    #[arg(short = 'd', long, conflicts_with = "samples")]
    duration: Option<u64>,

    /// Interrupt after this many samples per channel
    #[arg(short = 's', long)]
    samples: Option<u64>,

    /// Use the memory-mapped transfer primitives
    #[arg(short = 'M', long)]
    mmap: bool,

    /// Open the device in nonblocking mode
    #[arg(short = 'N', long)]
    nonblock: bool,

    /// Distance between interrupts in microseconds
    #[arg(short = 'F', long = "period-time")]
    period_time: Option<u32>,

    /// Distance between interrupts in frames
    #[arg(long = "period-size")]
    period_size: Option<usize>,

    /// Buffer duration in microseconds
    #[arg(short = 'B', long = "buffer-time")]
    buffer_time: Option<u32>,

    /// Buffer duration in frames
    #[arg(long = "buffer-size")]
    buffer_size: Option<usize>,

    /// Min available space for wakeup in microseconds
    #[arg(short = 'A', long = "avail-min")]
    avail_min: Option<u32>,

    /// Delay for automatic PCM start in microseconds (relative to buffer
    /// size if not positive)
    #[arg(short = 'R', long = "start-delay")]
    start_delay: Option<i64>,

    /// Delay for automatic PCM stop in microseconds from xrun
    #[arg(short = 'T', long = "stop-delay")]
    stop_delay: Option<i64>,

    /// Show PCM setup and progress (accumulative)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Enable the VU meter (mono or stereo)
    #[arg(short = 'V', long)]
    vumeter: Option<String>,

    /// One file for each channel
    #[arg(short = 'I', long = "separate-channels")]
    separate_channels: bool,

    /// Allow interactive pause/resume from stdin
    #[arg(short, long)]
    interactive: bool,

    /// Test ring buffer position
    #[arg(long = "test-position")]
    test_position: bool,

    /// Out-of-range coefficient for the position test
    #[arg(long = "test-coef", default_value_t = 8)]
    test_coef: i64,

    /// Do not wait for the ring buffer (burns a whole CPU)
    #[arg(long = "test-nowait")]
    test_nowait: bool,

    /// Start another output file after this many seconds of recording
    #[arg(long = "max-file-time")]
    max_file_time: Option<u64>,

    /// Write the process ID here
    #[arg(long = "process-id-file")]
    process_id_file: Option<PathBuf>,

    /// Expand the output file name with the strftime facility
    #[arg(long = "use-strftime")]
    use_strftime: bool,

    /// Treat all recoverable errors as fatal
    #[arg(long = "fatal-errors")]
    fatal_errors: bool,

    /// Files to play, or the capture target ('-' or none for stdin/stdout)
    files: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            // aborted by the user: the transfer did not complete
            if !cli.quiet {
                eprintln!("Aborted by signal...");
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("pcmstream: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    use tracing_subscriber::EnvFilter;
    let default = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "error",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pcm_stream={default},pcmstream={default}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Runs the requested transfer. `Ok(true)` is a clean finish, `Ok(false)`
/// an abort; both release the device, restore the terminal and remove the
/// pid file on the way out.
fn run(cli: &Cli) -> Result<bool, StreamError> {
    let direction = if cli.capture {
        Direction::Capture
    } else {
        Direction::Playback
    };

    let request = build_request(cli, direction)?;
    let limit = build_limit(cli);

    if direction == Direction::Capture
        && cli.format.is_none()
        && io::stdin().is_terminal()
        && request.format.significant_bits <= 8
    {
        eprintln!(
            "Warning: Some sources (like microphones) may produce inaudible results\n\
             \u{20}        with 8-bit sampling. Use '-f' to increase resolution e.g. '-f S16_LE'."
        );
    }

    let (device, config) = AlsaDevice::open(&cli.device, direction, &request)?;

    let _pid_guard = cli
        .process_id_file
        .as_deref()
        .map(PidFile::write)
        .transpose()?;

    let opts = SessionOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
        fatal_errors: cli.fatal_errors,
        busy_poll: cli.test_nowait,
    };
    let mut session = StreamSession::new(device, config, opts)?;

    if let Some(mode) = meter_mode(cli, &session) {
        let style = if cli.verbose >= 3 {
            MeterStyle::Diagnostic
        } else {
            MeterStyle::Bar
        };
        let format = session.config().format;
        session = session.with_meter(PeakMeter::new(format, mode, style));
    }
    if cli.test_position {
        let buffer_frames = session.config().buffer_frames;
        session = session.with_monitor(PositionMonitor::new(
            cli.test_coef,
            buffer_frames,
            direction,
            cli.verbose > 0,
        ));
    }

    let quiet = cli.quiet;
    session = session.with_events(event_callback(move |event| {
        if quiet {
            return;
        }
        match event {
            StreamEvent::XrunRecovered { elapsed, fault } => {
                let ms = elapsed.map(|d| d.as_secs_f64() * 1000.0).unwrap_or(0.0);
                eprintln!("{fault}!!! (at least {ms:.3} ms long)");
            }
            StreamEvent::SuspendRecovered { reprimed } => {
                if reprimed {
                    eprintln!("Suspended. Resume failed, stream restarted.");
                } else {
                    eprintln!("Suspended. Trying resume. Done.");
                }
            }
            StreamEvent::CaptureRebound => {
                eprintln!("capture stream format change? attempting recover...");
            }
            StreamEvent::FileRotated { path, .. } => {
                eprintln!("Recording continues in '{}'", path.display());
            }
            StreamEvent::SuspiciousPosition { total, avail, delay } => {
                eprintln!("Suspicious buffer position ({total} total): avail = {avail}, delay = {delay}");
            }
            StreamEvent::Paused | StreamEvent::Resumed => {}
        }
    }));

    // terminal raw mode + signal wiring
    let flags = session.flags();
    register_signals(&flags)?;
    let term_guard = if cli.interactive && io::stdin().is_terminal() {
        let guard = term::RawStdin::enter()?;
        session = session.with_control(InteractiveControl::new(Box::new(term::TermKeys)));
        Some(guard)
    } else {
        None
    };

    let result = dispatch(cli, &mut session, limit, direction);
    drop(term_guard);
    if session.flags().is_aborted() && cli.verbose >= 2 {
        eprintln!();
    }
    result?;

    Ok(!session.flags().is_aborted())
}

fn dispatch(
    cli: &Cli,
    session: &mut StreamSession<AlsaDevice>,
    limit: TransferLimit,
    direction: Direction,
) -> Result<(), StreamError> {
    match direction {
        Direction::Playback => {
            if cli.files.is_empty() || cli.files == ["-"] {
                header(cli, session, "stdin");
                let stdin = io::stdin();
                pipeline::playback(session, &mut stdin.lock(), "stdin", limit)?;
            } else {
                for name in &cli.files {
                    header(cli, session, name);
                    let mut file =
                        File::open(name).map_err(|e| StreamError::file(name, e))?;
                    pipeline::playback(session, &mut file, name, limit)?;
                    if session.flags().is_aborted() {
                        break;
                    }
                }
            }
        }
        Direction::Capture => {
            let target = cli.files.first().map(String::as_str);
            if target.is_none() || target == Some("-") {
                header(cli, session, "stdout");
                let stdout = io::stdout();
                pipeline::capture_to(session, &mut stdout.lock(), "stdout", limit)?;
            } else {
                let name = target.expect("checked above");
                header(cli, session, name);
                let policy = if cli.use_strftime {
                    NamePolicy::TimePattern
                } else {
                    NamePolicy::Counter
                };
                let mut series = match cli.max_file_time {
                    Some(secs) => CaptureFileSeries::with_max_file_time(
                        name,
                        policy,
                        secs,
                        session.config().bytes_per_second(),
                    ),
                    None => CaptureFileSeries::new(name, policy, None),
                };
                pipeline::capture(session, &mut series, limit)?;
            }
        }
    }
    Ok(())
}

fn build_request(cli: &Cli, direction: Direction) -> Result<DeviceRequest, StreamError> {
    let mut request = DeviceRequest {
        start_delay_us: cli.start_delay.unwrap_or(i64::from(direction == Direction::Capture)),
        stop_delay_us: cli.stop_delay.unwrap_or(0),
        period_time_us: cli.period_time,
        period_frames: cli.period_size,
        buffer_time_us: cli.buffer_time,
        buffer_frames: cli.buffer_size,
        avail_min_us: cli.avail_min,
        nonblock: cli.nonblock,
        ..DeviceRequest::default()
    };

    if let Some(spec) = cli.format.as_deref() {
        if let Some(preset) = FormatPreset::parse(spec) {
            request.format = preset.format();
            request.rate = preset.rate();
            request.channels = preset.channels();
        } else {
            request.format = SampleFormat::parse(spec)
                .ok_or_else(|| StreamError::config(format!("wrong extended format '{spec}'")))?;
        }
    }
    if let Some(channels) = cli.channels {
        if !(1..=256).contains(&channels) {
            return Err(StreamError::config(format!(
                "value {channels} for channels is invalid"
            )));
        }
        request.channels = channels;
    }
    if let Some(rate) = cli.rate {
        request.rate = if rate < 1000 { rate * 1000 } else { rate };
    }
    if cli.separate_channels {
        request.access = AccessMode::Planar;
    }
    if cli.mmap {
        request.method = TransferMethod::MemoryMapped;
    }
    Ok(request)
}

fn build_limit(cli: &Cli) -> TransferLimit {
    if let Some(secs) = cli.duration {
        TransferLimit::Seconds(secs)
    } else if let Some(samples) = cli.samples {
        TransferLimit::Samples(samples)
    } else {
        TransferLimit::Unlimited
    }
}

fn meter_mode(cli: &Cli, session: &StreamSession<AlsaDevice>) -> Option<MeterMode> {
    let requested = match cli.vumeter.as_deref() {
        Some(s) if s.starts_with('s') => Some(MeterMode::Stereo),
        Some(s) if s.starts_with('m') => Some(MeterMode::Mono),
        Some(_) => None,
        // extra verbosity implies a mono meter
        None if cli.verbose > 1 => Some(MeterMode::Mono),
        None => None,
    }?;
    // a stereo meter needs an interleaved 2-channel stream and a line to draw on
    if requested == MeterMode::Stereo
        && (session.config().channels != 2 || cli.separate_channels || cli.verbose > 2)
    {
        return Some(MeterMode::Mono);
    }
    Some(requested)
}

fn header(cli: &Cli, session: &StreamSession<AlsaDevice>, name: &str) {
    if cli.quiet {
        return;
    }
    let config = session.config();
    let action = match config.direction {
        Direction::Playback => "Playing",
        Direction::Capture => "Recording",
    };
    let channels = match config.channels {
        1 => "Mono".to_string(),
        2 => "Stereo".to_string(),
        n => format!("Channels {n}"),
    };
    eprintln!(
        "{action} raw '{name}' : {}, Rate {} Hz, {channels}",
        config.format.description(),
        config.rate
    );
}

fn register_signals(flags: &SessionFlags) -> Result<(), StreamError> {
    use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
    let map = |e: io::Error| StreamError::config(format!("cannot install signal handler: {e}"));
    signal_hook::flag::register(SIGINT, flags.abort_handle()).map_err(map)?;
    signal_hook::flag::register(SIGTERM, flags.abort_handle()).map_err(map)?;
    signal_hook::flag::register(SIGUSR1, flags.rotate_handle()).map_err(map)?;
    Ok(())
}

/// Pid file written at start, removed on drop.
struct PidFile(PathBuf);

impl PidFile {
    fn write(path: &std::path::Path) -> Result<Self, StreamError> {
        let mut file = File::create(path).map_err(|e| StreamError::file(path, e))?;
        writeln!(file, "{}", std::process::id()).map_err(|e| StreamError::file(path, e))?;
        Ok(Self(path.to_path_buf()))
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Raw-terminal plumbing for interactive mode.
mod term {
    use std::io;
    use std::mem::MaybeUninit;
    use std::os::fd::RawFd;

    use pcm_stream::{KeySource, StreamError};

    const STDIN: RawFd = 0;

    /// Puts stdin into non-canonical, nonblocking mode; restores on drop.
    pub struct RawStdin {
        saved: libc::termios,
    }

    impl RawStdin {
        pub fn enter() -> Result<Self, StreamError> {
            // SAFETY: plain termios/fcntl syscalls on the stdin descriptor
            unsafe {
                let mut term = MaybeUninit::<libc::termios>::uninit();
                if libc::tcgetattr(STDIN, term.as_mut_ptr()) != 0 {
                    return Err(StreamError::config("cannot read terminal attributes"));
                }
                let saved = term.assume_init();
                let mut raw = saved;
                raw.c_lflag &= !libc::ICANON;
                if libc::tcsetattr(STDIN, libc::TCSANOW, &raw) != 0 {
                    return Err(StreamError::config("cannot set terminal attributes"));
                }
                let flags = libc::fcntl(STDIN, libc::F_GETFL);
                if flags < 0 || libc::fcntl(STDIN, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                    eprintln!("stdin O_NONBLOCK flag setup failed");
                }
                Ok(Self { saved })
            }
        }
    }

    impl Drop for RawStdin {
        fn drop(&mut self) {
            // SAFETY: restoring the attributes captured in enter()
            unsafe {
                let _ = libc::tcsetattr(STDIN, libc::TCSANOW, &self.saved);
            }
        }
    }

    /// Keystrokes from the raw stdin descriptor.
    pub struct TermKeys;

    impl KeySource for TermKeys {
        fn poll_key(&mut self) -> Option<u8> {
            let mut byte = 0u8;
            // SAFETY: reading one byte from the nonblocking stdin descriptor
            let n = unsafe { libc::read(STDIN, std::ptr::addr_of_mut!(byte).cast(), 1) };
            (n == 1).then_some(byte)
        }

        fn wait_key(&mut self) -> io::Result<u8> {
            loop {
                let mut pfd = libc::pollfd {
                    fd: STDIN,
                    events: libc::POLLIN,
                    revents: 0,
                };
                // SAFETY: blocking poll on the stdin descriptor
                let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
                if rc < 0 {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(err);
                }
                if let Some(byte) = self.poll_key() {
                    return Ok(byte);
                }
            }
        }
    }
}
