use std::env;
use std::io::Write;

use zimage::{
    logger::{self, LogLevel, LoggerConfig},
    CancellationToken, ChatClient, ImageClient, ImageSize, MemoryImageStore, ModelScopeClient,
    ModelScopeConfig, Session, ZImageError, RESOLUTION_GROUPS,
};

const USAGE: &str = "usage:
  zimage image <prompt> [WIDTHxHEIGHT]
  zimage chat <message>
  zimage models";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let level = if env::var("ZIMAGE_DEBUG").is_ok() {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    logger::init_with_config(LoggerConfig::new().with_level(level))?;

    if dotenv_loaded {
        log::debug!(".env file loaded");
    } else {
        log::debug!("No .env file found, using process environment");
    }

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let config = ModelScopeConfig::from_env();
    if config.api_key.is_none() && command != "models" {
        log::error!("MODELSCOPE_API_KEY is not set");
        return Err(Box::new(ZImageError::ConfigError(
            "MODELSCOPE_API_KEY is required".into(),
        )) as Box<dyn std::error::Error>);
    }
    let client = ModelScopeClient::new(config);

    let outcome = match command.as_str() {
        "image" => {
            let Some(prompt) = args.get(1) else {
                eprintln!("{}", USAGE);
                return Ok(());
            };
            let size = match args.get(2) {
                Some(raw) => raw.parse::<ImageSize>()?,
                None => ImageSize::default(),
            };
            generate_image(&client, prompt, size).await
        }
        "chat" => {
            let message = args[1..].join(" ");
            if message.trim().is_empty() {
                eprintln!("{}", USAGE);
                return Ok(());
            }
            chat(&client, &message).await
        }
        "models" => {
            list_models();
            Ok(())
        }
        other => {
            eprintln!("unknown command {:?}\n{}", other, USAGE);
            return Ok(());
        }
    };

    if let Err(e) = &outcome {
        log::error!("{}", e);
        if let Some(hint) = e.hint() {
            log::warn!("{}", hint);
        }
    }
    outcome.map_err(Into::into)
}

async fn generate_image(
    client: &ModelScopeClient,
    prompt: &str,
    size: ImageSize,
) -> zimage::Result<()> {
    let _timer = logger::timer("Image generation");
    let mut session = Session::open(MemoryImageStore::new()).await?;

    let request = client.image().request(prompt).with_size(size);
    let reference = client.image().generate(&request).await?;
    log::info!("Image ready: {}", reference);

    let bytes = client.image().fetch_image(&reference).await?;
    let entry = session.record_image(&request, &bytes).await?;

    let filename = format!(
        "zimage_{}.png",
        entry.timestamp.format("%Y%m%d_%H%M%S")
    );
    std::fs::write(&filename, &bytes)
        .map_err(|e| ZImageError::StorageError(format!("writing {}: {}", filename, e)))?;
    log::info!("Saved {} ({} bytes)", filename, bytes.len());
    Ok(())
}

async fn chat(client: &ModelScopeClient, message: &str) -> zimage::Result<()> {
    let mut session = Session::open(MemoryImageStore::new()).await?;
    let outgoing = session.begin_turn(message);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    let result = client
        .chat()
        .ask_streaming(
            &outgoing,
            None,
            |fragment| {
                session.append_fragment(fragment);
                let _ = write!(stdout, "{}", fragment);
                let _ = stdout.flush();
            },
            &cancel,
        )
        .await;
    println!();

    match result {
        Err(ZImageError::Cancelled) => {
            log::warn!("Chat interrupted");
            Ok(())
        }
        other => other.map(|_| ()),
    }
}

fn list_models() {
    println!("Image models:");
    for model in ImageClient::supported_models() {
        println!("  {:<50} {}", model.id, model.label);
    }
    println!("Chat models:");
    for model in ChatClient::supported_models() {
        println!("  {:<50} {}", model.id, model.label);
    }
    println!("Sizes:");
    for group in RESOLUTION_GROUPS {
        let sizes: Vec<String> = group
            .presets
            .iter()
            .map(|p| format!("{} {}", p.ratio, p.size))
            .collect();
        println!("  {}: {}", group.name, sizes.join(", "));
    }
}
