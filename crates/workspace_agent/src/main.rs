use std::io::{self, Read};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, MutexGuard};

use agent_workspace::Workspace;
use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use workspace_agent::config::AgentConfig;
use workspace_agent::dispatcher::Dispatcher;
use workspace_agent::report::{render_execution, render_tree};
use workspace_agent::runtime::SessionRuntime;
use workspace_agent::transcript::{Mode, Transcript};
use workspace_agent::{logging, providers};
use workspace_store::WorkspaceStore;

const USAGE: &str = "usage: workspace-agent [--resume <workspace-id>] [prompt...]
Reads the prompt from stdin when none is given.";

struct Args {
    resume: Option<String>,
    prompt: Option<String>,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args> {
    let mut resume = None;
    let mut words = Vec::new();

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "-h" | "--help" => bail!("{USAGE}"),
            "--resume" => match raw.next() {
                Some(id) => resume = Some(id),
                None => bail!("--resume needs a workspace id\n{USAGE}"),
            },
            _ => words.push(arg),
        }
    }

    let prompt = if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    };
    Ok(Args { resume, prompt })
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("workspace-agent: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let config = AgentConfig::from_env().context("loading configuration")?;
    logging::init(&config.log_filter);

    let args = parse_args(std::env::args().skip(1))?;
    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("reading prompt from stdin")?;
            input
        }
    };

    let (store, workspace) = open_store(&config, args.resume.as_deref())?;
    let conversation_id = store.as_ref().map(|store| store.workspace_id().to_string());

    let provider = providers::provider_for_config(&config, conversation_id.as_deref())
        .context("initializing provider")?;
    let executor = providers::executor_for_config(&config).context("initializing executor")?;

    let workspace = Arc::new(Mutex::new(workspace));
    let mut dispatcher = Dispatcher::new(Arc::clone(&workspace));
    if let Some(executor) = executor {
        dispatcher = dispatcher.with_executor(executor);
    }
    if let Some(store) = store {
        dispatcher = dispatcher.with_store(Arc::new(store));
    }

    let runtime = SessionRuntime::new(
        provider,
        dispatcher,
        Transcript::new(config.system_prompt.clone()),
    );
    let profile = runtime.profile();
    info!(provider = %profile.provider_id, model = %profile.model_id, "session ready");

    runtime.run_turn(&prompt).context("starting run")?;

    if let Mode::Error(error) = runtime.mode() {
        eprintln!("Run failed: {error}");
        return Ok(ExitCode::FAILURE);
    }

    let transcript = runtime.transcript();
    if let Some(reply) = transcript.last_reply().filter(|reply| !reply.is_empty()) {
        println!("{reply}\n");
    }

    let tree = render_tree(&lock_unpoisoned(&workspace));
    if !tree.is_empty() {
        println!("Workspace:\n{tree}");
    }

    let mut exit = ExitCode::SUCCESS;
    for handle in runtime.take_executions() {
        match handle.wait() {
            Ok(response) => {
                if !response.success {
                    exit = ExitCode::FAILURE;
                }
                println!("{}\n", render_execution(&response));
            }
            Err(error) => {
                warn!(%error, "execution worker lost");
                exit = ExitCode::FAILURE;
            }
        }
    }

    Ok(exit)
}

fn open_store(
    config: &AgentConfig,
    resume: Option<&str>,
) -> Result<(Option<WorkspaceStore>, Workspace)> {
    let Some(base) = config.store_dir.as_deref() else {
        if resume.is_some() {
            bail!("--resume needs AGENT_WORKSPACE_STORE_DIR to be set");
        }
        return Ok((None, Workspace::new()));
    };

    match resume {
        Some(workspace_id) => {
            let store = WorkspaceStore::open(base, workspace_id)
                .with_context(|| format!("opening workspace {workspace_id}"))?;
            let workspace = store
                .load_snapshot()
                .context("loading workspace snapshot")?
                .map(Workspace::from_snapshot)
                .unwrap_or_default();
            info!(workspace_id, files = workspace.contents().len(), "resumed workspace");
            Ok((Some(store), workspace))
        }
        None => {
            let store = WorkspaceStore::create_new(base).context("creating workspace store")?;
            info!(workspace_id = store.workspace_id(), "created workspace");
            Ok((Some(store), Workspace::new()))
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
