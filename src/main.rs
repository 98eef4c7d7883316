use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use studysync::api::types::{DeckQuery, ReviewLog};
use studysync::api::{Backend, HttpBackend};
use studysync::clock::SystemClock;
use studysync::config::Config;
use studysync::platform::{EventBus, MemoryPlatform};
use studysync::quiz::{spawn_platform_listener, AnswerOutcome, QuizSessionMachine};
use studysync::sync::{
  spawn_session_watcher, BillingStatusCache, DeckSynchronizer, Invalidate, ProgressSynchronizer,
  SyncContext,
};
use studysync::timer::{TimerPhase, FRAME_INTERVAL};
use studysync::{logging, SyncError};

#[derive(Parser, Debug)]
#[command(name = "studysync")]
#[command(about = "Study flashcard decks and take quizzes, online or not")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/studysync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Start with the network marked unreachable
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List decks
  Decks {
    /// Bypass the cache
    #[arg(long)]
    force: bool,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long, default_value_t = 20)]
    per_page: u32,
    #[arg(long)]
    search: Option<String>,
  },
  /// Show study progress, for one deck or all of them
  Progress {
    #[arg(long)]
    deck: Option<u64>,
    #[arg(long)]
    force: bool,
  },
  /// Show dashboard totals
  Dashboard {
    #[arg(long)]
    force: bool,
  },
  /// Record a card review
  Review {
    #[arg(long)]
    deck: u64,
    #[arg(long)]
    card: u64,
    /// 1 (again) to 4 (easy)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
    rating: u8,
    #[arg(long, default_value_t = 0)]
    seconds: u32,
  },
  /// Take a quiz
  Quiz {
    /// Deck to draw questions from (repeatable)
    #[arg(long = "deck", required = true)]
    decks: Vec<u64>,
    #[arg(long, default_value_t = 10)]
    count: u32,
    /// Put a countdown on every question
    #[arg(long)]
    timer: bool,
  },
  /// Show subscription status
  Billing {
    #[arg(long)]
    force: bool,
  },
}

/// Everything the commands share.
struct Services {
  bus: EventBus,
  platform: Arc<MemoryPlatform>,
  backend: Arc<dyn Backend>,
  decks: Arc<DeckSynchronizer>,
  progress: Arc<ProgressSynchronizer>,
  billing: Arc<BillingStatusCache>,
  config: Config,
}

impl Services {
  fn new(config: Config, offline: bool) -> Result<Self> {
    let bus = EventBus::new();
    let token = Config::get_api_token();

    let platform = MemoryPlatform::new(bus.clone()).into_shared();
    platform.set_online(!offline);
    platform.set_credential(token.is_some());

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&config, token, bus.clone())?);
    let clock = Arc::new(SystemClock);
    let ctx = SyncContext::new(platform.clone(), clock.clone())
      .with_ttl(config.cache.ttl())
      .with_max_retry_attempts(config.cache.max_retry_attempts);

    let decks = Arc::new(DeckSynchronizer::new(backend.clone(), &ctx));
    let progress = Arc::new(ProgressSynchronizer::new(backend.clone(), &ctx));
    let billing =
      Arc::new(BillingStatusCache::new(backend.clone(), clock).with_ttl(config.billing.ttl()));

    let targets: Vec<Arc<dyn Invalidate>> = vec![
      decks.clone() as Arc<dyn Invalidate>,
      progress.clone() as Arc<dyn Invalidate>,
      billing.clone() as Arc<dyn Invalidate>,
    ];
    spawn_session_watcher(&bus, targets);

    Ok(Self {
      bus,
      platform,
      backend,
      decks,
      progress,
      billing,
      config,
    })
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init()?;
  info!(command = ?args.command, offline = args.offline, "starting");

  let services = Services::new(config, args.offline)?;
  if Config::get_api_token().is_none() {
    eprintln!("No API token set (STUDYSYNC_TOKEN); server data is unavailable.");
  }

  match args.command {
    Command::Decks {
      force,
      page,
      per_page,
      search,
    } => {
      let decks = match (page, search) {
        (None, None) => services.decks.fetch_all(force).await?,
        (page, search) => {
          let query = DeckQuery {
            page: page.unwrap_or(1),
            per_page,
            search,
          };
          let page = services.decks.fetch_page(&query, force).await?;
          if let Some(p) = page.pagination {
            println!("page {}/{} ({} decks)", p.page, p.total_pages.max(1), p.total);
          }
          page.items
        }
      };
      for deck in decks {
        println!("{:>6}  {:<40} {:>5} cards", deck.id, deck.name, deck.card_count);
      }
    }
    Command::Progress { deck, force } => {
      let rows = match deck {
        Some(id) => vec![services.progress.fetch_deck(id, force).await?],
        None => services.progress.fetch_all(force).await?,
      };
      for p in rows {
        println!(
          "deck {:>6}: {}/{} studied, {} mastered, {} due, {:.0}% accuracy",
          p.deck_id,
          p.cards_studied,
          p.cards_total,
          p.cards_mastered,
          p.due_today,
          p.accuracy * 100.0
        );
      }
    }
    Command::Dashboard { force } => {
      let d = services.progress.fetch_dashboard(force).await?;
      println!("decks:         {}", d.total_decks);
      println!("cards:         {}", d.total_cards);
      println!("due:           {}", d.cards_due);
      println!("reviews today: {}", d.reviews_today);
      println!("streak:        {} days", d.streak_days);
    }
    Command::Review {
      deck,
      card,
      rating,
      seconds,
    } => {
      let outcome = services
        .progress
        .log_review(&ReviewLog {
          deck_id: deck,
          card_id: card,
          rating,
          time_spent_seconds: seconds,
        })
        .await?;
      if outcome.tracking_disabled {
        println!("Review accepted; tracking is disabled for this account.");
      } else {
        println!("Review recorded.");
      }
    }
    Command::Quiz {
      decks,
      count,
      timer,
    } => run_quiz(&services, decks, count, timer).await?,
    Command::Billing { force } => {
      let status = services.billing.status(force).await?;
      println!(
        "plan: {} ({})",
        status.plan,
        if status.active { "active" } else { "inactive" }
      );
      if let Some(renews) = status.renews_at {
        println!("renews: {}", renews);
      }
    }
  }

  Ok(())
}

const QUIZ_HELP: &str = "Answer with an option number or text. \
  :offline / :online toggle the network, :hide / :show simulate the window, :quit aborts.";

/// Interactive quiz on stdin/stdout.
async fn run_quiz(services: &Services, decks: Vec<u64>, count: u32, timer: bool) -> Result<()> {
  let machine = Arc::new(
    QuizSessionMachine::new(
      services.backend.clone(),
      services.platform.clone(),
      Arc::new(SystemClock),
      services.bus.clone(),
    )
    .with_default_timer(services.config.quiz.default_timer()),
  );
  let listener = spawn_platform_listener(machine.clone(), &services.bus);

  machine.generate_quiz(decks, count, timer).await?;
  println!("{}", QUIZ_HELP);
  print_current(&machine);

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut frames = tokio::time::interval(FRAME_INTERVAL);

  loop {
    tokio::select! {
      _ = frames.tick() => {
        if machine.tick() {
          println!("Time is up.");
          answer_current(&machine, "").await;
          if !advance(&machine) {
            break;
          }
        }
      }
      line = lines.next_line() => {
        let Some(line) = line? else {
          machine.shutdown();
          return Ok(());
        };
        match handle_control(services, &machine, line.trim()) {
          Control::Handled => {}
          Control::Quit => {
            machine.reset_quiz();
            machine.shutdown();
            return Ok(());
          }
          Control::Answer(input) => {
            answer_current(&machine, &input).await;
            if !advance(&machine) {
              break;
            }
          }
        }
      }
    }
  }

  finish_quiz(services, &machine, &mut lines).await?;
  machine.shutdown();
  listener.abort();
  Ok(())
}

enum Control {
  Handled,
  Quit,
  Answer(String),
}

fn handle_control(services: &Services, machine: &QuizSessionMachine, input: &str) -> Control {
  match input {
    ":offline" => services.platform.set_online(false),
    ":online" => services.platform.set_online(true),
    ":hide" => services.platform.set_visible(false),
    ":show" => services.platform.set_visible(true),
    ":quit" => return Control::Quit,
    ":help" => println!("{}", QUIZ_HELP),
    answer => {
      let session = machine.session();
      let chosen = session.current_question().and_then(|q| {
        answer
          .parse::<usize>()
          .ok()
          .and_then(|n| n.checked_sub(1))
          .and_then(|i| q.options.get(i).cloned())
      });
      return Control::Answer(chosen.unwrap_or_else(|| answer.to_string()));
    }
  }
  Control::Handled
}

async fn answer_current(machine: &QuizSessionMachine, answer: &str) {
  let Some(question_id) = machine.session().current_question().map(|q| q.id.clone()) else {
    return;
  };
  match machine.submit_answer(&question_id, answer).await {
    Ok(AnswerOutcome::Scored(result)) if result.is_correct => println!("Correct."),
    Ok(AnswerOutcome::Scored(result)) => {
      println!("Incorrect. The answer is {}.", result.correct_answer);
      if let Some(feedback) = result.feedback {
        println!("{}", feedback);
      }
    }
    Ok(AnswerOutcome::Queued) => println!("Saved offline; it will be scored when you reconnect."),
    Err(e) => println!("Could not submit answer: {}", e),
  }
}

/// Move on; `false` once the last question is done.
fn advance(machine: &QuizSessionMachine) -> bool {
  match machine.next_question() {
    Ok(true) => {
      print_current(machine);
      true
    }
    _ => false,
  }
}

fn print_current(machine: &QuizSessionMachine) {
  let session = machine.session();
  let Some(q) = session.current_question() else {
    return;
  };
  println!();
  println!(
    "[{}/{}] {}",
    session.current_index + 1,
    session.questions.len(),
    q.prompt
  );
  for (i, option) in q.options.iter().enumerate() {
    println!("  {}. {}", i + 1, option);
  }
  let timer = machine.timer_state();
  if timer.phase != TimerPhase::Idle {
    println!("  ({}s)", timer.duration.as_secs());
  }
}

async fn finish_quiz(
  services: &Services,
  machine: &QuizSessionMachine,
  lines: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
  loop {
    if let Err(e) = machine.reconcile().await {
      println!("Could not sync saved answers: {}", e);
    }
    match machine.complete_quiz().await {
      Ok(result) => {
        println!();
        println!(
          "Score: {}/{} in {}s",
          result.correct_answers, result.total_questions, result.time_taken
        );
        return Ok(());
      }
      Err(SyncError::Rejected(message)) => {
        println!("{}", message);
        println!("Type :online to reconnect, or :quit.");
        let Some(line) = lines.next_line().await? else {
          return Ok(());
        };
        if let Control::Quit = handle_control(services, machine, line.trim()) {
          machine.reset_quiz();
          return Ok(());
        }
      }
      Err(e) => return Err(eyre!("Failed to complete quiz: {}", e)),
    }
  }
}
