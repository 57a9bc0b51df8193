//! Clickcheck sender.
//!
//! Builds a tracking link from the configured URL template and the
//! `key=value` arguments, merges it into a message template and sends the
//! message through the configured relay. On success the recipient, the link
//! and the parameters are written to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clickcheck::compose::{compose, rfc822z, MessageFields};
use clickcheck::config::DEFAULT_CONFIG_FILE;
use clickcheck::dispatch::{dispatch, Outgoing, Relay, SmtpRelay};
use clickcheck::ident::FileCounter;
use clickcheck::link::{build, fields_for_template, image_link};
use clickcheck::template::TemplateDir;
use clickcheck::{Config, RecordSink, TrackingParameters};

/// Send a message containing a tracking link
#[derive(Parser, Debug)]
#[command(name = "clicksend")]
#[command(version, about, long_about = None)]
struct Args {
    /// Alternate configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Recipient
    #[arg(long)]
    to: Option<String>,

    /// 822.From
    #[arg(long)]
    from: Option<String>,

    /// Template for message
    #[arg(long, default_value = "default")]
    template: String,

    /// Mark the mail sent with this note
    #[arg(long, default_value = "")]
    note: String,

    /// Path for link
    #[arg(long)]
    path: Option<String>,

    /// Link to this tracking image from the image directory
    #[arg(long)]
    image: Option<String>,

    /// Link parameters, as `key=value` tokens or a single `a=1&b=2` string
    params: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::load(&args.config).context("Failed to load configuration")?;

    // Use some defaults from the config file
    let (recipient, from) = config
        .addresses(args.to.as_deref(), args.from.as_deref())
        .with_context(|| format!("Use --to/--from or set them in {}", args.config))?;

    let params = TrackingParameters::from_args(&args.params);
    let url_template = config.url_template()?;
    let counter = FileCounter::new(&config.counter);

    let link = match &args.image {
        Some(image) => {
            if args.path.is_some() {
                warn!("path_ignored_for_image_link");
            }
            let (url, _) = image_link(url_template, &counter, &config.image_dir, image, &params)
                .context("Failed to create tracking image link")?;
            url
        }
        None => {
            let fields = fields_for_template(url_template, &counter)
                .context("Failed to prepare link fields")?;
            build(url_template, &fields, args.path.as_deref(), &params)
                .with_context(|| format!("Failed to build link from {}", url_template))?
        }
    };

    info!(link = %link, param_count = params.len(), "link_built");

    let fields = MessageFields {
        date: rfc822z(&chrono::Local::now()),
        to: recipient.clone(),
        from: from.clone(),
        note: args.note.clone(),
        link: link.to_string(),
    };
    let message = compose(&TemplateDir::new(&config.templates), &args.template, &fields)
        .context("Failed to build message")?;

    let relay = Relay::from_smarthost(&config.smarthost, &config.username, &config.password)?;
    let transport = SmtpRelay::new(relay)?;

    let outgoing = Outgoing {
        from,
        to: recipient,
        message,
        link: link.to_string(),
        params,
    };
    dispatch(&transport, &outgoing, &RecordSink::stdout())?;

    Ok(())
}
