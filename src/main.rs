use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};
use url::Url;

use blog_client::{
    api::Api,
    carousel::{AssetUrls, HttpPreloader, Viewport},
    client::{Client, ClientConfig, LogNotifier, ReqwestTransport},
    gallery::Gallery,
    navigation::Navigator,
    post_index::PostIndex,
    timeline::{Submission, Timeline, Upload},
    toc::{generate_toc, render_html, TocItem},
};

#[derive(Parser)]
#[command(name = "blog-client")]
#[command(about = "Command-line client for the blog and gallery API")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Origin the site is served from
    #[arg(long, env = "SITE_ORIGIN", default_value = "http://localhost:3000")]
    origin: String,

    /// Alternate API host for cross-origin deployments
    #[arg(long, env = "CLIENT_BASE_HOST")]
    api_host: Option<String>,

    #[arg(
        long,
        env = "THUMBNAIL_STYLE",
        default_value = blog_client::carousel::DEFAULT_THUMBNAIL_STYLE
    )]
    thumbnail_style: String,
}

#[derive(Subcommand)]
enum Command {
    /// List posts of a publish year (latest when omitted)
    Posts {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Print the table of contents of a post
    Post { id: i64 },
    /// Print the table of contents of a local markdown file
    Toc { file: PathBuf },
    /// Render a local markdown file to HTML
    Render { file: PathBuf },
    /// List gallery assets, loading older pages
    Gallery {
        #[arg(long, default_value = "1")]
        pages: usize,
    },
    /// Preload the preview window around a gallery asset
    Preview { index: usize },
    /// List timeline feeds, loading newer pages
    Timeline {
        #[arg(long, default_value = "1")]
        pages: usize,
    },
    /// Publish a feed to the timeline
    Publish {
        #[arg(long)]
        content: String,
        #[arg(long)]
        private: bool,
        #[arg(long = "asset")]
        assets: Vec<PathBuf>,
    },
    /// Show the signed-in user
    Whoami,
}

fn print_toc(toc: &[TocItem]) {
    for item in toc {
        let indent = "  ".repeat(usize::from(item.level.saturating_sub(1)));
        println!("{}- {} (#{})", indent, item.title, item.id);
    }
}

fn mime_for(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        _ => "image/jpeg",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let origin = Url::parse(&args.origin)
        .with_context(|| format!("invalid origin {}", args.origin))?;
    let config = ClientConfig::new(origin, args.api_host.clone());
    let client = Client::new(config, Arc::new(ReqwestTransport::new()?), Arc::new(LogNotifier));
    let api = Api::new(client);
    let urls = AssetUrls::new(args.thumbnail_style.clone());
    let viewport = Viewport {
        width: 1280.0,
        height: 800.0,
    };

    match args.command {
        Command::Posts { year } => {
            let index = PostIndex::load(api, year).await?;
            info!("Years: {:?}", index.years());
            for post in index.posts() {
                println!("{}\t{}\t{}", post.id, post.create_at.format("%Y-%m-%d"), post.title);
            }
        }
        Command::Post { id } => {
            let post = api.post(id).await?;
            println!("# {}", post.title);
            print_toc(&generate_toc(post.content.as_deref().unwrap_or_default()));
        }
        Command::Toc { file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            print_toc(&generate_toc(&text));
        }
        Command::Render { file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            print!("{}", render_html(&text));
        }
        Command::Gallery { pages } => {
            let mut gallery = Gallery::load(api, urls, viewport).await?;
            for _ in 1..pages {
                if !gallery.load_more().await? {
                    break;
                }
            }
            for asset in gallery.assets() {
                println!(
                    "{}\t{}x{}\t{}",
                    asset.id, asset.size.width, asset.size.height, asset.object_url
                );
            }
        }
        Command::Preview { index } => {
            let mut gallery = Gallery::load(api, urls, viewport).await?;
            gallery.preview(index, || info!("Preview closed"));
            let preloader = HttpPreloader::new(reqwest::Client::new());
            let carousel = gallery.carousel_mut();
            carousel.preload_pending(&preloader).await;
            for slot in carousel.slots() {
                println!(
                    "{}\t{:?}\tloaded={}\t{}",
                    slot.index,
                    carousel.relation(slot),
                    slot.loaded,
                    slot.src
                );
            }
        }
        Command::Timeline { pages } => {
            let mut timeline = Timeline::load(api).await?;
            timeline.load_all(pages.saturating_sub(1)).await?;
            if let Some(user) = timeline.banner_user() {
                println!("{}", user.nickname);
            }
            for feed in timeline.feeds() {
                println!(
                    "[{}] {} ({} images)",
                    feed.create_at.format("%Y-%m-%d %H:%M"),
                    feed.content,
                    feed.assets.len()
                );
            }
        }
        Command::Publish {
            content,
            private,
            assets,
        } => {
            let mut timeline = Timeline::load(api).await?;
            let mut navigator = Navigator::new("/timeline");
            let mut uploads = Vec::new();
            for path in assets {
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow!("invalid file name {}", path.display()))?
                    .to_string();
                uploads.push(Upload {
                    mime: mime_for(&path).to_string(),
                    file_name,
                    bytes,
                });
            }
            timeline.edit(&mut navigator, |form| {
                form.content = content;
                form.public = !private;
                form.assets = uploads;
            });
            match timeline.submit(&mut navigator).await? {
                Submission::Sent => info!("Feed published"),
                Submission::Invalid(error) => warn!("{}: {}", error.field, error.message),
                Submission::Busy => warn!("A submission is already in flight"),
            }
        }
        Command::Whoami => match api.current_user().await {
            Some(user) => println!("{} ({})", user.nickname, user.id),
            None => println!("anonymous"),
        },
    }

    Ok(())
}
