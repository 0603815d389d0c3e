//! SplatNet 3 token bootstrap
//!
//! One-shot CLI that:
//! 1. Prints the Nintendo Account authorize URL
//! 2. Reads the pasted redirect (or `skip` for manual token entry)
//! 3. Runs the token pipeline (session token → gtoken → bulletToken)
//! 4. Prints the tokens as JSON on stdout
//!
//! Logs and prompts go to stderr. Exit code 0 on success, 1 on any failure
//! or Ctrl+C.

mod config;
mod error;
mod prompt;

use anyhow::{Context, Result, bail};
use nso_auth::{NsoClient, RedirectInput, Secret, Tokens, normalize_bullet_token, validate_gtoken};
use serde::Serialize;
use std::process::ExitCode;
use tokio::io::AsyncBufRead;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::prompt::Prompter;

/// What ends up on stdout.
#[derive(Serialize)]
struct TokenOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,
    gtoken: String,
    bullet_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<String>,
}

impl TokenOutput {
    fn from_tokens(session_token: Option<&Secret>, tokens: Tokens) -> Self {
        Self {
            session_token: session_token.map(|t| t.expose().to_owned()),
            gtoken: tokens.gtoken.expose().to_owned(),
            bullet_token: tokens.bullet_token.expose().to_owned(),
            nickname: Some(tokens.nickname),
            language: Some(tokens.language),
            country: Some(tokens.country),
        }
    }

    fn manual(gtoken: String, bullet_token: String) -> Self {
        Self {
            session_token: None,
            gtoken,
            bullet_token,
            nickname: None,
            language: None,
            country: None,
        }
    }
}

#[derive(Debug)]
enum Login {
    Session(Secret),
    Skip,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    match until_interrupted(run(), interrupt_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(
            e.downcast_ref::<error::Error>(),
            Some(error::Error::Interrupted)
        ) =>
        {
            eprintln!("\nBye!");
            // A pending stdin read would hold up runtime shutdown.
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = format!("{e:#}"), "splatnet-token failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Drive `work` to completion unless `interrupt` resolves first.
async fn until_interrupted<W, I>(work: W, interrupt: I) -> Result<()>
where
    W: Future<Output = Result<()>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        result = work => result,
        () = interrupt => Err(error::Error::Interrupted.into()),
    }
}

/// Wait for SIGINT. Never resolves if the handler cannot be installed.
async fn interrupt_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

async fn run() -> Result<()> {
    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let source = Config::resolve_path(cli_config_path);
    info!(path = %source.path.display(), explicit = source.explicit, "loading configuration");

    let config = Config::load(&source)
        .with_context(|| format!("failed to load config from {}", source.path.display()))?;

    info!(
        f_gen_url = %config.attestation.url,
        use_old_app_version = config.app.use_old_app_version,
        timeout_secs = config.http.timeout_secs,
        session_token_from_env = config.session_token.is_some(),
        "configuration loaded"
    );

    let client = NsoClient::new(config.client_config()).context("failed to build HTTP client")?;
    let mut prompter = Prompter::stdin();

    let (session_token, from_login) = match config.session_token.clone() {
        Some(token) => (token, false),
        None => match login(&client, &mut prompter).await? {
            Login::Session(token) => (token, true),
            Login::Skip => {
                let output = manual_entry(&mut prompter).await?;
                return print_tokens(&output);
            }
        },
    };

    let tokens = client
        .acquire_tokens(&session_token, &config.app.user_agent)
        .await
        .context("token generation failed")?;
    if tokens.bullet_token.is_empty() {
        bail!("SplatNet 3 did not return a bulletToken; wait a few minutes and try again");
    }

    let shown = from_login.then_some(&session_token);
    print_tokens(&TokenOutput::from_tokens(shown, tokens))
}

/// Walk the operator through the browser login until a session token is
/// obtained or they ask to skip.
async fn login<R: AsyncBufRead + Unpin>(
    client: &NsoClient,
    prompter: &mut Prompter<R>,
) -> Result<Login> {
    let request = client.authorization_request();
    eprintln!("Navigate to this URL in your browser:\n{}\n", request.url);
    eprintln!(
        "Log in, right click the \"Select this account\" button, copy the link address, and paste it below.\n\
         Type \"skip\" instead to enter a gtoken and bulletToken by hand."
    );

    loop {
        let answer = prompter.ask("Redirect URL: ").await?;
        match RedirectInput::parse(&answer) {
            RedirectInput::Skip => return Ok(Login::Skip),
            RedirectInput::Code(code) => {
                let token = client
                    .redeem(&request, &code)
                    .await
                    .context("session token exchange failed")?;
                return Ok(Login::Session(token));
            }
            RedirectInput::Malformed => {
                warn!("pasted text did not contain a session token code");
                eprintln!("Malformed URL. Please try again, or press Ctrl+C to exit.");
            }
        }
    }
}

async fn manual_entry<R: AsyncBufRead + Unpin>(prompter: &mut Prompter<R>) -> Result<TokenOutput> {
    eprintln!("Enter the tokens captured from the NSO app.");
    let gtoken = prompter.ask_until("gtoken: ", validate_gtoken).await?;
    let bullet_token = prompter
        .ask_until("bulletToken: ", normalize_bullet_token)
        .await?;
    info!("using manually entered tokens");
    Ok(TokenOutput::manual(gtoken, bullet_token))
}

fn print_tokens(output: &TokenOutput) -> Result<()> {
    let json = serde_json::to_string_pretty(output).context("failed to serialize tokens")?;
    println!("{json}");
    Ok(())
}
