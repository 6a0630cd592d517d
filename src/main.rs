use clap::{error::ErrorKind, ArgAction, Args, CommandFactory, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use log::{info, warn};
use rand::thread_rng;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use serde_json::{json, Value};
use showspeed::{
    api::Api,
    app_dirs::AppDirs,
    auth::{self, TokenSigner},
    client::{self, LocalApi, ResultSubmitter, SubmitOutcome},
    config::{Config, ConfigStore, FileConfigStore},
    error::ApiResponse,
    logging,
    metrics::Metrics,
    runtime::{CancelToken, CrosstermEventSource, FixedTicker, Runner, SessionEvent},
    sentences::{self, DirSentences, EmbeddedSentences, SentenceSource},
    session::{Session, SessionConfig, TestMode},
    store::{SqliteStore, TestResult},
    ui::{self, ResultsView, TypingView},
};
use std::{
    error::Error,
    io::{self, stdin},
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
};

/// typing speed test with a local leaderboard
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Cli {
    /// more log output (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// results database to use instead of the configured one
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// run a typing test (the default)
    Test(TestArgs),
    /// create an account
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// log in and remember the token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// forget the saved token
    Logout,
    /// show your statistics
    Stats,
    /// show the leaderboard
    Leaderboard {
        #[arg(short, long)]
        mode: Option<TestMode>,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// write all your results to a csv file
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// list the time presets
    Times {
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct TestArgs {
    /// number of seconds to run the test
    #[arg(short, long, conflicts_with = "words")]
    secs: Option<u32>,

    /// number of words to type (50, 100, 150 or 200)
    #[arg(short, long)]
    words: Option<u32>,

    /// language code of the sentences
    #[arg(short, long)]
    language: Option<String>,

    /// directory with sentence files to use instead of the built-in ones
    #[arg(long)]
    data: Option<PathBuf>,
}

/// What a test run needs, after applying config defaults
#[derive(Debug, Clone, PartialEq)]
struct TestSettings {
    session: SessionConfig,
    language: String,
    word_count: u32,
}

impl TestSettings {
    fn resolve(args: &TestArgs, config: &Config) -> Result<Self, String> {
        let from_config = args.secs.is_none() && args.words.is_none();
        let mut session = match (args.secs, args.words) {
            (Some(secs), _) => SessionConfig::timed(secs),
            (None, Some(words)) => SessionConfig::words(words),
            (None, None) => SessionConfig {
                mode: config.mode,
                limit: config.limit,
                idle_timeout_secs: config.idle_timeout_secs,
            },
        };
        session.idle_timeout_secs = config.idle_timeout_secs;

        if session.limit == 0 {
            return Err("limit must be greater than zero".to_string());
        }

        let word_count = match session.mode {
            TestMode::Time => sentences::DEFAULT_WORD_COUNT,
            TestMode::Words if sentences::WORD_COUNT_BUCKETS.contains(&session.limit) => {
                session.limit
            }
            // the stored limit may still be a time preset
            TestMode::Words if from_config => {
                info!(
                    "config limit {} is not a word count, using {}",
                    session.limit,
                    sentences::DEFAULT_WORD_COUNT
                );
                session.limit = sentences::DEFAULT_WORD_COUNT;
                session.limit
            }
            TestMode::Words => {
                return Err(format!(
                    "word count must be one of {:?}",
                    sentences::WORD_COUNT_BUCKETS
                ))
            }
        };

        Ok(Self {
            session,
            language: args.language.clone().unwrap_or_else(|| config.language.clone()),
            word_count,
        })
    }
}

fn sentence_source(data: Option<&Path>) -> Box<dyn SentenceSource> {
    match data {
        Some(dir) => Box::new(DirSentences::new(dir)),
        None => Box::new(EmbeddedSentences),
    }
}

struct Context {
    config_store: FileConfigStore,
    config: Config,
    api: Arc<Api<SqliteStore>>,
}

impl Context {
    fn open(cli: &Cli) -> Result<Self, Box<dyn Error>> {
        let config_store = match &cli.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        };
        let mut config = config_store.load();

        let secret = match config.token_secret.clone() {
            Some(secret) => secret,
            None => {
                let secret = auth::generate_secret();
                config.token_secret = Some(secret.clone());
                config_store.save(&config)?;
                info!("generated token secret in {}", config_store.path().display());
                secret
            }
        };

        let db_path = cli
            .db
            .clone()
            .or_else(|| config.db_path())
            .ok_or("could not determine a location for the results database")?;
        let store = SqliteStore::open(db_path)?;

        Ok(Self {
            config_store,
            config,
            api: Arc::new(Api::new(Arc::new(store), TokenSigner::new(secret))),
        })
    }

    fn client(&self) -> LocalApi<SqliteStore> {
        LocalApi::new(Arc::clone(&self.api))
    }

    fn bearer(&self) -> Result<String, Box<dyn Error>> {
        Ok(format!("Bearer {}", self.token()?))
    }

    fn token(&self) -> Result<&str, Box<dyn Error>> {
        self.config
            .token
            .as_deref()
            .ok_or_else(|| "not logged in, run `showspeed login` first".into())
    }
}

fn into_result(response: ApiResponse) -> Result<Value, Box<dyn Error>> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(response
            .error_message()
            .unwrap_or("request failed")
            .to_string()
            .into())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let command = cli
        .command
        .clone()
        .unwrap_or_else(|| Command::Test(TestArgs::default()));

    let log_file = match command {
        Command::Test(_) => AppDirs::log_path(),
        _ => None,
    };
    logging::init_logger(cli.verbose, log_file.as_deref())?;

    match command {
        Command::Test(args) => run_test(&cli, &args),
        Command::Signup {
            name,
            email,
            password,
        } => {
            let ctx = Context::open(&cli)?;
            into_result(ctx.api.sign_up(&json!({
                "name": name,
                "email": email,
                "password": password,
            })))?;
            println!("account created, run `showspeed login` to sign in");
            Ok(())
        }
        Command::Login { email, password } => {
            let mut ctx = Context::open(&cli)?;
            let body = into_result(ctx.api.login(&json!({
                "email": email,
                "password": password,
            })))?;

            let token = body["token"]
                .as_str()
                .ok_or("login response carried no token")?;
            ctx.config.token = Some(token.to_string());
            ctx.config_store.save(&ctx.config)?;

            println!("logged in as {}", body["user"]["name"].as_str().unwrap_or(&email));
            Ok(())
        }
        Command::Logout => {
            let store = match &cli.config {
                Some(path) => FileConfigStore::with_path(path),
                None => FileConfigStore::new(),
            };
            let mut config = store.load();
            config.token = None;
            store.save(&config)?;
            println!("logged out");
            Ok(())
        }
        Command::Stats => {
            let ctx = Context::open(&cli)?;
            let stats = match client::stats_unless_unauthorized(&ctx.client(), ctx.token()?) {
                Ok(stats) => stats,
                Err(err) => {
                    warn!("stats rejected: {err}");
                    return Err("session expired, run `showspeed login` again".into());
                }
            };
            print!("{}", ui::format_stats(&stats));
            Ok(())
        }
        Command::Leaderboard { mode, limit } => {
            let ctx = Context::open(&cli)?;
            let board = client::leaderboard_or_empty(
                &ctx.client(),
                mode.unwrap_or(ctx.config.mode),
                limit.unwrap_or(ctx.config.leaderboard_limit),
            );
            print!("{}", ui::format_leaderboard(&board));
            Ok(())
        }
        Command::Export { output } => {
            let ctx = Context::open(&cli)?;
            let body = into_result(ctx.api.my_results(Some(&ctx.bearer()?)))?;
            let results: Vec<TestResult> = serde_json::from_value(body["results"].clone())?;

            let mut writer = csv::Writer::from_path(&output)?;
            for result in &results {
                writer.serialize(result)?;
            }
            writer.flush()?;

            println!("wrote {} results to {}", results.len(), output.display());
            Ok(())
        }
        Command::Times { data } => {
            for preset in sentence_source(data.as_deref()).times()? {
                println!("{:>4}s  {}", preset.duration, preset.label);
            }
            Ok(())
        }
    }
}

fn run_test(cli: &Cli, args: &TestArgs) -> Result<(), Box<dyn Error>> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let ctx = Context::open(cli)?;
    let settings = match TestSettings::resolve(args, &ctx.config) {
        Ok(settings) => settings,
        Err(msg) => Cli::command().error(ErrorKind::InvalidValue, msg).exit(),
    };
    let source = sentence_source(args.data.as_deref());
    // fail before touching the terminal
    source.sentences(&settings.language, settings.word_count)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = start_tui(&mut terminal, &ctx, &settings, source.as_ref());

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

enum Screen {
    Typing,
    Results {
        metrics: Metrics,
        outcome: SubmitOutcome,
    },
}

fn new_session(
    settings: &TestSettings,
    source: &dyn SentenceSource,
    done: &mpsc::Sender<Metrics>,
) -> Result<Session, Box<dyn Error>> {
    let candidates = source.sentences(&settings.language, settings.word_count)?;
    let reference = sentences::reference_text(&candidates, &mut thread_rng());
    let done = done.clone();

    Ok(
        Session::new(reference, settings.session.clone()).on_complete(move |metrics| {
            let _ = done.send(*metrics);
        }),
    )
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    ctx: &Context,
    settings: &TestSettings,
    source: &dyn SentenceSource,
) -> Result<(), Box<dyn Error>> {
    let (done_tx, done_rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let mut submitter =
        ResultSubmitter::new(ctx.client(), ctx.config.token.clone()).with_cancel_token(cancel.clone());
    let mut runner = Runner::new(CrosstermEventSource::new(), FixedTicker::default());

    let mut session = new_session(settings, source, &done_tx)?;
    let mut screen = Screen::Typing;

    loop {
        terminal.draw(|f| match &screen {
            Screen::Typing => f.render_widget(TypingView::new(&session), f.area()),
            Screen::Results { metrics, outcome } => {
                f.render_widget(ResultsView::new(metrics, Some(outcome)), f.area())
            }
        })?;

        let on_results = matches!(screen, Screen::Results { .. });

        match (on_results, runner.step()) {
            (_, SessionEvent::Quit) | (true, SessionEvent::Char('q')) => {
                cancel.cancel();
                break;
            }
            (true, SessionEvent::Char('r')) | (_, SessionEvent::Restart) => {
                session.restart();
                submitter.reset();
                screen = Screen::Typing;
            }
            (true, SessionEvent::Char('n')) => {
                session = new_session(settings, source, &done_tx)?;
                submitter.reset();
                screen = Screen::Typing;
            }
            (false, SessionEvent::Char(c)) => {
                session.write(c);
            }
            (false, SessionEvent::Backspace) => {
                session.backspace();
            }
            (false, SessionEvent::Tick) => {
                session.on_tick();
            }
            _ => {}
        }

        if let Ok(metrics) = done_rx.try_recv() {
            let outcome = submitter.on_finished(&metrics, settings.session.mode, settings.session.limit);
            if outcome == SubmitOutcome::Failed {
                warn!("result of this session was not saved");
            }
            screen = Screen::Results { metrics, outcome };
        }
    }

    Ok(())
}
