use amqp_producer::amqp::{Headers, LapinFabric, LapinTransport, PropertyMap};
use amqp_producer::{Config, JsonSchemaValidator, Producer};
use anyhow::Context;
use base64::Engine;
use clap::Parser;
use lapin::{Connection, ConnectionProperties};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "amqp-producer")]
#[command(about = "Publish a message to an AMQP exchange", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(help = "Message body, read from stdin when omitted")]
    body: Option<String>,

    #[arg(short, long, help = "Routing key, defaults to the configured one")]
    routing_key: Option<String>,

    #[arg(short = 'H', long = "header", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    headers: Vec<(String, Value)>,

    #[arg(short, long = "property", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    properties: Vec<(String, Value)>,

    #[arg(long, value_name = "FILE", help = "JSON schema the body must satisfy")]
    schema: Option<PathBuf>,

    #[arg(long, value_name = "FILE", requires = "schema", help = "Shared schema definitions")]
    definitions: Option<PathBuf>,

    #[arg(long, help = "Body is base64 encoded")]
    base64: bool,

    #[arg(long, help = "Set the timestamp property to the current time")]
    timestamp: bool,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Loading configuration from {:?}", args.config);
    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;

    info!(
        amqp_uri = %redact(&config.amqp.uri),
        exchange = %config.exchange.name,
        content_type = %config.producer.content_type,
        confirm_publish = config.amqp.confirm_publish,
        "Configuration summary"
    );

    let body = read_body(args.body.as_deref(), args.base64).await?;

    let connection = Connection::connect(&config.amqp.uri, ConnectionProperties::default())
        .await
        .context("failed to connect to broker")?;
    let channel = connection.create_channel().await?;

    let transport = if config.amqp.confirm_publish {
        LapinTransport::with_confirms(channel.clone()).await?
    } else {
        LapinTransport::new(channel.clone())
    };
    let fabric = LapinFabric::new(channel, config.exchange.clone(), config.queue.clone());

    let mut producer =
        Producer::new(&config.exchange.name, transport, fabric).with_config(config.producer.clone());

    if let Some(schema_path) = &args.schema {
        let schema = read_json(schema_path).await?;
        let definitions = match &args.definitions {
            Some(path) => read_json(path).await?,
            None => Value::Null,
        };
        producer.set_validator(JsonSchemaValidator::new, schema, definitions)?;
    }

    let mut properties: PropertyMap = args.properties.into_iter().collect();
    if args.timestamp {
        properties.insert(
            "timestamp".to_string(),
            Value::from(chrono::Utc::now().timestamp()),
        );
    }
    let headers: Headers = args.headers.into_iter().collect();

    let result = producer
        .publish(body, args.routing_key.as_deref(), &properties, Some(&headers))
        .await;

    if let Err(e) = connection.close(200, "Bye").await {
        error!("Failed to close connection cleanly: {}", e);
    }

    match result {
        Ok(()) => {
            info!("Message published to exchange '{}'", producer.exchange());
            Ok(())
        }
        Err(e) if e.is_validation() => {
            error!("Message rejected: {}", e);
            Err(e.into())
        }
        Err(e) => {
            error!("Publish failed: {}", e);
            Err(e.into())
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }

    // numbers, booleans and JSON literals keep their type
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

async fn read_body(arg: Option<&str>, base64: bool) -> anyhow::Result<Vec<u8>> {
    let raw = match arg {
        Some(body) => body.as_bytes().to_vec(),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("failed to read body from stdin")?;
            buf
        }
    };

    if !base64 {
        return Ok(raw);
    }

    let text = String::from_utf8(raw).context("base64 body is not valid UTF-8")?;
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .context("body is not valid base64")
}

async fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {:?}", path))
}

fn redact(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***{}", &uri[..scheme], &uri[at..])
        }
        _ => uri.to_string(),
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("amqp_producer=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("amqp_producer=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
