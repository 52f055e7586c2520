//! Terminal front end for the intake wizard.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use catcher_backend::{IntakeBackend, LlmBackend, MockBackend};
use catcher_intake::{
    Actor, RenderCommand, Renderer, ResultAction, Scope, Wizard, WizardConfig, STEPS,
};
use catcher_llm::ServiceStatus;
use catcher_review::Decision;
use catcher_types::{ArtifactBundle, ArtifactKind, Provenance};

#[derive(Parser)]
#[command(
    name = "catcher",
    version,
    about = "Moyamoya Catcher: turn a community activity's worries into a plan"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use built-in placeholder content instead of the completion service
    #[arg(long, global = true)]
    mock: bool,

    /// Model name passed to the completion service (sets CATCHER_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Skip the simulated typing pause
    #[arg(long, global = true)]
    no_delay: bool,

    /// Seconds before a running generation may be cancelled
    #[arg(long, global = true, default_value = "20")]
    cancel_grace_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive intake conversation
    Chat,

    /// Print the step script and its branches
    Script,

    /// Report whether the completion service is configured
    Status,

    /// Open a saved artifact bundle and review it
    Review {
        /// Path to a bundle written with `:save`
        bundle: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(model) = &cli.model {
        std::env::set_var("CATCHER_MODEL", model);
    }

    match cli.command {
        Commands::Script => {
            cmd_script();
        }
        Commands::Status => {
            cmd_status(cli.mock);
        }
        Commands::Chat => {
            let mut wizard = build_wizard(&cli);
            wizard.start().await;
            run_loop(&mut wizard).await?;
        }
        Commands::Review { ref bundle } => {
            let loaded = ArtifactBundle::load(bundle)?;
            println!("Bundle: {} ({})", bundle.display(), loaded.provenance.as_str());
            let mut wizard = build_wizard(&cli);
            wizard.open_bundle(loaded).await?;
            run_loop(&mut wizard).await?;
        }
    }

    Ok(())
}

fn build_wizard(cli: &Cli) -> Wizard {
    let mut config =
        WizardConfig::default().with_cancel_grace(Duration::from_secs(cli.cancel_grace_secs));
    if cli.no_delay {
        config = config.without_delay();
    }
    Wizard::new(select_backend(cli.mock), Box::new(ConsoleRenderer), config)
}

fn select_backend(mock: bool) -> Arc<dyn IntakeBackend> {
    if mock || !ServiceStatus::from_env().key_configured {
        tracing::info!("Using placeholder backend");
        return Arc::new(MockBackend::new());
    }
    match LlmBackend::from_env() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            tracing::warn!(error = %e, "Completion service unavailable, using placeholder backend");
            Arc::new(MockBackend::new())
        }
    }
}

fn cmd_status(mock: bool) {
    let status = ServiceStatus::from_env();
    println!("Key configured: {}", status.key_configured);
    println!("Model: {}", status.model);
    let backend = if mock || !status.key_configured {
        Provenance::Mock
    } else {
        Provenance::Upstream
    };
    println!("Backend: {}", backend.as_str());
}

fn cmd_script() {
    println!("Steps: {}", STEPS.len());
    for (i, step) in STEPS.iter().enumerate() {
        let slot = step.slot.map_or("-", |s| s.as_str());
        let mut flags = Vec::new();
        if step.skip.is_some() {
            flags.push("conditional");
        }
        if step.on_select.is_some() {
            flags.push("hook");
        }
        if step.generate {
            flags.push("generate");
        }
        if step.offers_other() {
            flags.push("free-text");
        }
        println!("\n{:>2}. {} slot={} [{}]", i, step.id, slot, flags.join(", "));
        for choice in step.choices {
            println!("    {}) {} = {}", choice.letter, choice.label, choice.value);
        }
    }
}

// ---------------------------------------------------------------------------
// Input loop
// ---------------------------------------------------------------------------

const HELP: &str = "\
Commands:
  A / B / C / D      pick a choice (the value works too)
  <text>             answer an open text field
  :back              go to the previous question
  :cancel            close the text field and show the choices again
  :generate          generate the documents (Ctrl-C cancels)
  :close             close the results
  :results           reopen the results
  :chat              ask free questions about the results
  :export [file]     write all documents as one markdown file
  :save <file>       save the documents as a bundle
  :edit <tab> <file> replace a document (profile, plan, funding, messages)
  :review <n>        ask the expert panel about message section n
  :accept | :reject  decide on the current suggestion
  :alt <text>        accept with your own wording
  :finalize | :skip  leave the review
  :quit";

#[derive(Debug, PartialEq)]
enum Input {
    Empty,
    Quit,
    Help,
    Back,
    Cancel,
    Generate,
    Close,
    Reopen,
    Chat,
    Export(Option<PathBuf>),
    Save(PathBuf),
    Edit(ArtifactKind, PathBuf),
    Review(usize),
    Decide(Decision),
    Finalize,
    Skip,
    Text(String),
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix(':') else {
        return Input::Text(line.to_string());
    };
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(n, r)| (n, r.trim()));
    match (name, rest) {
        ("q" | "quit", _) => Input::Quit,
        ("h" | "help", _) => Input::Help,
        ("back", _) => Input::Back,
        ("cancel", _) => Input::Cancel,
        ("generate" | "g", _) => Input::Generate,
        ("close", _) => Input::Close,
        ("results", _) => Input::Reopen,
        ("chat", _) => Input::Chat,
        ("export", "") => Input::Export(None),
        ("export", path) => Input::Export(Some(PathBuf::from(path))),
        ("save", "") => Input::Invalid("usage: :save <file>".into()),
        ("save", path) => Input::Save(PathBuf::from(path)),
        ("edit", rest) => match rest.split_once(char::is_whitespace) {
            Some((tab, path)) => match tab.parse() {
                Ok(kind) => Input::Edit(kind, PathBuf::from(path.trim())),
                Err(e) => Input::Invalid(e.to_string()),
            },
            None => Input::Invalid("usage: :edit <tab> <file>".into()),
        },
        ("review", n) => match n.parse::<usize>() {
            Ok(n) if n > 0 => Input::Review(n - 1),
            _ => Input::Invalid("usage: :review <section number>".into()),
        },
        ("accept" | "a", _) => Input::Decide(Decision::Accept),
        ("reject" | "r", _) => Input::Decide(Decision::Reject),
        ("alt", "") => Input::Invalid("usage: :alt <text>".into()),
        ("alt", text) => Input::Decide(Decision::Alternative(text.to_string())),
        ("finalize", _) => Input::Finalize,
        ("skip", _) => Input::Skip,
        (other, _) => Input::Invalid(format!("unknown command ':{other}' (try :help)")),
    }
}

async fn run_loop(wizard: &mut Wizard) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Help => println!("{HELP}"),
            Input::Invalid(message) => println!("{message}"),
            input => {
                if let Err(e) = dispatch(wizard, input).await {
                    tracing::debug!(error = %e, "Input rejected");
                    println!("⚠️  {e}");
                }
            }
        }
    }
    println!("またね 👋");
    Ok(())
}

async fn dispatch(wizard: &mut Wizard, input: Input) -> anyhow::Result<()> {
    match input {
        Input::Back => {
            if !wizard.go_back().await? {
                println!("これ以上戻れません");
            }
        }
        Input::Cancel => {
            if !wizard.cancel_free_input().await {
                println!("キャンセルできる入力欄はありません");
            }
        }
        Input::Generate => run_generation(wizard).await?,
        Input::Close => wizard.close_results().await?,
        Input::Reopen => wizard.reopen_results().await?,
        Input::Chat => wizard.enter_free_chat().await?,
        Input::Export(path) => {
            let markdown = wizard.export_markdown(chrono::Local::now().date_naive())?;
            match path {
                Some(path) => {
                    std::fs::write(&path, markdown)?;
                    println!("Exported: {}", path.display());
                }
                None => println!("{markdown}"),
            }
        }
        Input::Save(path) => {
            wizard.bundle()?.save(&path)?;
            println!("Saved: {}", path.display());
        }
        Input::Edit(kind, path) => {
            let markdown = std::fs::read_to_string(&path)?;
            wizard.edit_artifact(kind, &markdown).await?;
        }
        Input::Review(index) => {
            wizard.request_review(index).await?;
        }
        Input::Decide(decision) => {
            wizard.review_decide(decision).await?;
        }
        Input::Finalize => {
            wizard.finalize_review().await?;
        }
        Input::Skip => {
            wizard.skip_review().await?;
        }
        Input::Text(text) => answer(wizard, &text).await?,
        Input::Empty | Input::Quit | Input::Help | Input::Invalid(_) => {}
    }
    Ok(())
}

/// Plain text is a choice pick unless a text field is open.
async fn answer(wizard: &mut Wizard, text: &str) -> anyhow::Result<()> {
    if wizard.session().free_input().is_open() {
        wizard.submit_text(text).await?;
        return Ok(());
    }
    let picked = wizard
        .session()
        .offered()
        .iter()
        .find(|c| text.eq_ignore_ascii_case(&c.letter.to_string()) || c.value == text);
    match picked {
        Some(choice) => {
            wizard.select(choice.value).await?;
        }
        None if wizard.session().at_generation() && wizard.artifacts().is_none() => {
            println!(":generate で作成を始めます");
        }
        None => println!("選択肢の記号（A〜D）で答えてください"),
    }
    Ok(())
}

async fn run_generation(wizard: &mut Wizard) -> anyhow::Result<()> {
    let handle = wizard.abort_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    });
    let outcome = wizard.generate().await;
    watcher.abort();
    tracing::info!(outcome = ?outcome.as_ref().ok(), "Generation finished");
    outcome?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Console renderer
// ---------------------------------------------------------------------------

struct ConsoleRenderer;

impl ConsoleRenderer {
    fn print_markdown(title: &str, markdown: &str) {
        println!("\n━━━━ {title} ━━━━\n{}", markdown.trim_end());
    }
}

impl Renderer for ConsoleRenderer {
    fn render(&mut self, command: &RenderCommand) {
        match command {
            RenderCommand::Progress { done, total } => println!("\n[{done}/{total}]"),
            RenderCommand::Typing | RenderCommand::Remove(_) | RenderCommand::GenerationDone => {}
            RenderCommand::Append(entry) => {
                let prefix = match entry.actor {
                    Actor::System => "🐱",
                    Actor::User => "🙋",
                };
                println!("{prefix} {}", entry.content.to_plain());
            }
            RenderCommand::TruncateFrom(step) => {
                println!("── ひとつ前に戻ります（質問 {}）──", step + 1);
            }
            RenderCommand::Choices {
                choices,
                can_go_back,
            } => {
                for choice in choices {
                    println!("  {}) {}", choice.letter, choice.label);
                }
                if *can_go_back {
                    println!("  (:back でひとつ前に戻る)");
                }
            }
            RenderCommand::ClearChoices | RenderCommand::HideFreeInput => {}
            RenderCommand::FreeInput {
                placeholder,
                cancellable,
            } => {
                let hint = if *cancellable { "  (:cancel で選択肢に戻る)" } else { "" };
                println!("✍️  {placeholder}{hint}");
            }
            RenderCommand::GenerateButton => println!("✨ :generate で資料を作成します"),
            RenderCommand::GenerationPending { stages } => {
                for stage in stages.iter() {
                    println!("   {stage}");
                }
            }
            RenderCommand::CancelAvailable => println!("   (Ctrl-C でキャンセルできます)"),
            RenderCommand::Results {
                tabs,
                sections,
                notice,
            } => {
                if let Some(notice) = notice {
                    println!("\n{notice}");
                }
                for tab in tabs {
                    Self::print_markdown(tab.kind.label(), &tab.markdown);
                }
                if !sections.is_empty() {
                    println!("\n専門家チェック（:review <番号>）:");
                    for section in sections {
                        println!("  {}. {}", section.index + 1, section.title);
                    }
                }
                println!("\n(:close で閉じる / :edit <tab> <file> で書き換え)");
            }
            RenderCommand::ArtifactUpdated(view) => {
                if view.pending_marks > 0 {
                    println!(
                        "✏️  {} を更新しました（変更 {} 件）",
                        view.kind.label(),
                        view.pending_marks
                    );
                } else {
                    println!("✏️  {} を更新しました", view.kind.label());
                }
            }
            RenderCommand::ResultActions(actions) => {
                for action in actions {
                    let command = match action {
                        ResultAction::Reopen => ":results",
                        ResultAction::Export => ":export",
                        ResultAction::Chat => ":chat",
                    };
                    println!("  {} ({command})", action.label());
                }
            }
            RenderCommand::EnterScope(scope) | RenderCommand::ExitScope(scope) => {
                let entered = matches!(command, RenderCommand::EnterScope(_));
                tracing::debug!(?scope, entered, "Scope change");
                if matches!(command, RenderCommand::ExitScope(Scope::Review)) {
                    println!("── 専門家チェックを閉じました ──");
                }
            }
            RenderCommand::ReviewLoading { title, .. } => {
                println!("\n🔎 「{title}」を専門家が確認しています…");
            }
            RenderCommand::Reviewer {
                persona,
                suggestions,
            } => match persona {
                Some(p) => println!("{} {}（{}）: 提案 {suggestions} 件", p.avatar, p.persona, p.role),
                None => println!("提案 {suggestions} 件"),
            },
            RenderCommand::Suggestion {
                position,
                total,
                suggestion,
            } => {
                println!("\n── 提案 {position}/{total}（{}）──", suggestion.tab.label());
                if !suggestion.reason.is_empty() {
                    println!("理由: {}", suggestion.reason);
                }
                println!("- {}\n+ {}", suggestion.before, suggestion.after);
                println!("(:accept / :reject / :alt <文章>)");
            }
            RenderCommand::ReviewComplete { message, .. } => {
                println!("\n✅ {message}\n(:finalize で確定 / :skip でそのまま閉じる)");
            }
            RenderCommand::ReviewClosed { reviewed, .. } => {
                let done: Vec<String> = reviewed.iter().map(|i| (i + 1).to_string()).collect();
                println!("確認済みのセクション: {}", done.join(", "));
            }
            RenderCommand::Toast(text) | RenderCommand::Notice(text) => println!("{text}"),
        }
    }
}
