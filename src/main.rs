//! call-ai binary entry point

use std::io::Write;

use call_ai::{
    cli::{ChatArgs, Cli, Commands},
    config::{Config, Settings},
    messages::{Message, Prompt},
    services::{streaming::Completion, CallAi, Schema},
};
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Install error handler
    color_eyre::install()?;
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    let config = Config::load();

    // per-call debug logs are debug-level events
    let debug = cli.verbose
        || matches!(&cli.command, Some(Commands::Chat(args)) if args.debug)
        || config
            .as_ref()
            .is_ok_and(|c| c.settings.debug == Some(true));

    let mut filter = EnvFilter::from_default_env();
    if debug {
        filter = filter.add_directive("call_ai=debug".parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Chat(args)) => chat(config?, args).await?,
        Some(Commands::Config {
            list,
            path,
            set,
            global,
        }) => {
            if !set.is_empty() {
                let target = if global {
                    Config::global_config_path()
                } else {
                    Config::project_config_path()
                };
                let mut settings = Settings::load_from_path(&target)?;
                for pair in &set {
                    let (key, value) = pair
                        .split_once('=')
                        .ok_or_else(|| eyre!("expected KEY=VALUE, got {pair:?}"))?;
                    settings.set(key.trim(), value.trim())?;
                }
                settings.save_to_path(&target)?;
                println!("updated {}", target.display());
            }
            if path || (!list && set.is_empty()) {
                println!("global:  {}", Config::global_config_path().display());
                println!("project: {}", Config::project_config_path().display());
            }
            if list {
                let mut settings = config?.settings;
                if settings.api_key.is_some() {
                    settings.api_key = Some("<redacted>".to_string());
                }
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
        }
        Some(Commands::Version) => {
            println!("call-ai version {}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            println!("Use --help for more information");
        }
    }

    Ok(())
}

async fn chat(config: Config, args: ChatArgs) -> Result<()> {
    let mut options = config.call_options();
    if let Some(model) = args.model {
        options.model = model;
    }
    if let Some(endpoint) = args.endpoint {
        options.endpoint = Some(endpoint);
    }
    if let Some(max_tokens) = args.max_tokens {
        options.max_tokens = Some(max_tokens);
    }
    if let Some(temperature) = args.temperature {
        options.temperature = Some(temperature);
    }
    if let Some(path) = &args.schema {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading schema {}", path.display()))?;
        let value = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("parsing schema {}", path.display()))?;
        let mut schema = Schema::new(value).with_strict(!args.no_strict);
        if let Some(name) = args.schema_name {
            schema = schema.with_name(name);
        }
        options.schema = Some(schema);
    }
    options.debug |= args.debug;

    let prompt = match args.system {
        Some(system) => Prompt::Messages(vec![Message::system(system), Message::user(args.prompt)]),
        None => Prompt::Text(args.prompt),
    };

    let client = CallAi::new()?;

    let completion = if args.stream {
        let mut stream = client.stream(prompt, &options).await?;
        let mut stdout = std::io::stdout();
        let mut printed = String::new();
        let mut last = None;

        while let Some(snapshot) = stream.next().await {
            let snapshot = snapshot?;
            // snapshots are cumulative; print only what is new
            match snapshot.text.strip_prefix(printed.as_str()) {
                Some(new_text) => write!(stdout, "{new_text}")?,
                None => write!(stdout, "\n{}", snapshot.text)?,
            }
            stdout.flush()?;
            printed = snapshot.text;
            last = snapshot.completion;
        }
        writeln!(stdout)?;
        last
    } else {
        Some(client.complete(prompt, &options).await?)
    };

    match completion {
        Some(Completion {
            value: Some(value), ..
        }) if !args.stream => println!("{}", serde_json::to_string_pretty(&value)?),
        Some(completion) if !args.stream => println!("{}", completion.text),
        _ => {}
    }

    Ok(())
}
