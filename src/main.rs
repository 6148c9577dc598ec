use clap::{Parser, Subcommand};
use color_eyre::{Report, Result};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use yagi::{
  Config, ErrorKind, NoopStorage, SqliteStorage, StateStore, TemplateService, Transport,
};

#[derive(Parser, Debug)]
#[command(name = "yagi")]
#[command(about = "Generate .gitignore files from cached gitignore templates")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./yagi.yaml or $XDG_CONFIG_HOME/yagi/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Template API base URL, overriding the configured one
  #[arg(long, global = true)]
  endpoint: Option<Url>,

  /// Bypass the persistent cache
  #[arg(long, global = true)]
  no_cache: bool,

  /// Enable debug logging
  #[arg(long, global = true)]
  debug: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print every available template name
  List,
  /// Print the combined .gitignore for the given templates
  Generate {
    /// Template names (defaults to the configured defaultTemplates)
    templates: Vec<String>,
  },
  /// Remove all cached template data
  ClearCache,
}

/// Log to stderr so generated content on stdout stays clean.
///
/// Level: `--debug`, else `RUST_LOG`, else info.
fn init_tracing(debug: bool) -> tracing_appender::non_blocking::WorkerGuard {
  let filter = if debug {
    EnvFilter::new("yagi=debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("yagi=info"))
  };

  let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

  tracing_subscriber::registry()
    .with(fmt::layer().with_target(false).with_writer(writer))
    .with(filter)
    .init();

  guard
}

async fn run<S: StateStore + 'static>(
  service: TemplateService<S>,
  config: &Config,
  command: Command,
) -> yagi::Result<()> {
  match command {
    Command::List => {
      for name in service.get_templates(config).await? {
        println!("{}", name);
      }
    }
    Command::Generate { templates } => {
      let templates = if templates.is_empty() {
        config.default_templates.clone()
      } else {
        templates
      };
      let content = service.get_gitignore_content(config, &templates).await?;
      print!("{}", content);
    }
    Command::ClearCache => {
      service.clear_all_cache()?;
      eprintln!("Cache cleared.");
    }
  }

  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.debug);

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override endpoint if specified on command line
  let config = if let Some(endpoint) = args.endpoint {
    Config {
      custom_api_endpoint: Some(endpoint),
      ..config
    }
  } else {
    config
  };
  config.validate()?;

  let transport = Transport::new()?;
  let result = if args.no_cache {
    run(TemplateService::new(NoopStorage, transport), &config, args.command).await
  } else {
    let storage = SqliteStorage::open()?;
    run(TemplateService::new(storage, transport), &config, args.command).await
  };

  result.map_err(|e| match e.kind() {
    ErrorKind::Network if e.is_retryable() => {
      Report::new(e).wrap_err("Could not reach the template API; check your connection and try again")
    }
    ErrorKind::Api => Report::new(e).wrap_err("The template API rejected the request"),
    _ => Report::new(e),
  })
}
