//! Bootstraps a small devebot application from the `config` directory next to
//! this crate and prints what was assembled.
//!
//! ```text
//! cargo run -p basic-app -- --sandbox dev
//! DEVEBOT_UPGRADE_DISABLED=manifest-refiner cargo run -p basic-app
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use devebot::config::LoaderOptions;
use devebot::kernel::{
    BridgeModule, DialectContext, GadgetContext, GadgetDescriptor, Kernel, KernelParams,
    PluginModule, instance,
};
use devebot::primitives::{ModuleKind, ModuleRef};
use devebot::telemetry::{Level, install_subscriber};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "basic-app", about = "Assemble a sample devebot application")]
struct Cli {
    /// Application root holding `config/` and `plugins/`.
    #[arg(long, default_value = env!("CARGO_MANIFEST_DIR"))]
    root: PathBuf,
    /// Profile variants to include, comma separated.
    #[arg(long, value_delimiter = ',')]
    profile: Option<Vec<String>>,
    /// Sandbox variants to include, comma separated.
    #[arg(long, value_delimiter = ',')]
    sandbox: Option<Vec<String>>,
    /// Only build gadgets whose name matches this pattern.
    #[arg(long)]
    gadgets: Option<String>,
    /// Print the merged sandbox configuration.
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug)]
struct HttpClient {
    base_url: String,
}

#[derive(Debug)]
struct Mailer {
    host: String,
    port: u64,
    relay: Arc<HttpClient>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    install_subscriber("info")?;

    let options = LoaderOptions {
        profile: cli.profile,
        sandbox: cli.sandbox,
        ..LoaderOptions::new("basic-app")
    };
    let mut params = KernelParams::new(options)
        .with_app(ModuleRef::new("basic-app", &cli.root, ModuleKind::Application)?)
        .with_plugin(
            PluginModule::new(ModuleRef::plugin(
                "devebot-plugin-mailer",
                cli.root.join("plugins/mailer"),
            )?)
            .with_gadget(GadgetDescriptor::service("mailer", build_mailer)),
        )
        .with_bridge(BridgeModule::from_fn(
            ModuleRef::bridge("devebot-co-http", cli.root.join("bridges/http"))?,
            build_http_client,
        ))
        .with_app_gadget(GadgetDescriptor::trigger("greeter", |ctx: &GadgetContext<'_>| {
            let logger = ctx.logging.logger();
            logger.log(Level::INFO, format!("greeting is {}", ctx.config["greeting"]));
            Ok(instance(ctx.config["greeting"].clone()))
        }));
    if let Some(pattern) = cli.gadgets {
        params = params.with_gadget_filter(pattern);
    }

    let kernel = Kernel::assemble(params).context("bootstrap failed")?;

    info!(mode = ?kernel.mode(), "components: {:?}", kernel.injector().names());
    if let Some(mailer) = kernel.lookup::<Mailer>("devebot-plugin-mailer/mailer") {
        info!(
            host = %mailer.host,
            port = mailer.port,
            relay = %mailer.relay.base_url,
            "mailer ready"
        );
    }
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&kernel.config().sandbox.mixture)?);
    }
    Ok(())
}

fn build_http_client(ctx: &DialectContext) -> Result<devebot::kernel::Instance> {
    let base_url = ctx
        .config
        .get("url")
        .and_then(Value::as_str)
        .with_context(|| format!("dialect {} needs a `url`", ctx.name))?;
    Ok(instance(HttpClient {
        base_url: base_url.to_owned(),
    }))
}

fn build_mailer(ctx: &GadgetContext<'_>) -> Result<devebot::kernel::Instance> {
    let relay = ctx
        .injector
        .lookup::<HttpClient>("devebot-plugin-mailer/devebot-co-http/relay")
        .context("relay dialect is not available")?;
    Ok(instance(Mailer {
        host: ctx.config["host"].as_str().unwrap_or("localhost").to_owned(),
        port: ctx.config["port"].as_u64().unwrap_or(25),
        relay,
    }))
}
