// ABOUTME: CLI binary for the page-harvest extraction engine.
// ABOUTME: Runs one site extractor over a URL or a saved HTML file and prints its JSON envelope.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use page_harvest::{Engine, Pacing, Site, StaticPage};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(about = "Extract structured data from a web page")]
struct Args {
    /// Extractor to run (airtable, github_repo, github_search, google_docs,
    /// lark_docs, linkedin_profile, linkedin_company). Detected from the URL when omitted.
    #[arg(short = 's', long = "site")]
    site: Option<Site>,

    /// HTML file to extract from (requires --url)
    #[arg(long = "html")]
    html: Option<PathBuf>,

    /// Page address for the HTML file (required with --html)
    #[arg(long = "url")]
    url: Option<String>,

    /// Extractor parameters as a JSON object
    #[arg(short = 'p', long = "params", conflicts_with = "params_file")]
    params: Option<String>,

    /// File holding the extractor parameters as a JSON object
    #[arg(long = "params-file")]
    params_file: Option<PathBuf>,

    /// Pause a randomized human-like interval between extraction stages
    #[arg(long = "pace")]
    pace: bool,

    /// Allow fetching from private/local networks
    #[arg(long = "allow-private-networks")]
    allow_private_networks: bool,

    /// Output file path (default: stdout)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Print the envelope on one line instead of pretty-printed
    #[arg(long = "compact")]
    compact: bool,

    /// Print elapsed time in ms to stderr
    #[arg(long = "timing")]
    timing: bool,

    /// Page URL to fetch (fetch mode)
    #[arg(conflicts_with = "html")]
    target: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_params(args: &Args) -> Result<JsonValue, String> {
    let raw = match (&args.params, &args.params_file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .map_err(|e| format!("error reading params file {:?}: {}", path, e))?,
        (None, None) => return Ok(JsonValue::Null),
    };
    let params: JsonValue =
        serde_json::from_str(&raw).map_err(|e| format!("error parsing params JSON: {}", e))?;
    if !(params.is_object() || params.is_null()) {
        return Err("error: params must be a JSON object".to_string());
    }
    Ok(params)
}

fn pick_site(explicit: Option<Site>, url: &str) -> Result<Site, String> {
    explicit
        .or_else(|| Site::detect(url))
        .ok_or_else(|| format!("error: cannot detect a site for {}; pass --site", url))
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    if args.html.is_some() && args.url.is_none() {
        eprintln!("error: --url is required when using --html");
        return ExitCode::from(1);
    }
    if args.html.is_none() && args.target.is_none() {
        eprintln!("error: a URL is required, or use --html with --url");
        return ExitCode::from(1);
    }

    let params = match read_params(&args) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::from(1);
        }
    };

    let mut builder = Engine::builder().allow_private_networks(args.allow_private_networks);
    if args.pace {
        builder = builder.pacing(Pacing::human());
    }
    let engine = builder.build();

    let start = Instant::now();
    let doc = match (&args.html, &args.url, &args.target) {
        (Some(html_path), Some(url), _) => {
            let site = match pick_site(args.site, url) {
                Ok(site) => site,
                Err(msg) => {
                    eprintln!("{}", msg);
                    return ExitCode::from(1);
                }
            };
            let html = match fs::read_to_string(html_path) {
                Ok(html) => html,
                Err(e) => {
                    eprintln!("error reading file {:?}: {}", html_path, e);
                    return ExitCode::from(1);
                }
            };
            let page = StaticPage::new(url.as_str(), html);
            engine.harvest(site, &page, &params).await
        }
        (_, _, Some(target)) => {
            let site = match pick_site(args.site, target) {
                Ok(site) => site,
                Err(msg) => {
                    eprintln!("{}", msg);
                    return ExitCode::from(1);
                }
            };
            match engine.http_page(target) {
                Ok(page) => engine.harvest(site, &page, &params).await,
                Err(e) => {
                    eprintln!("error: {}", e);
                    return ExitCode::from(1);
                }
            }
        }
        _ => {
            eprintln!("error: a URL is required, or use --html with --url");
            return ExitCode::from(1);
        }
    };
    let elapsed = start.elapsed();

    let rendered = if args.compact {
        serde_json::to_string(&doc)
    } else {
        serde_json::to_string_pretty(&doc)
    };
    let output_str = match rendered {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error serializing output: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Some(output_path) = &args.output {
        if let Err(e) = fs::write(output_path, &output_str) {
            eprintln!("error writing to {:?}: {}", output_path, e);
            return ExitCode::from(1);
        }
    } else {
        println!("{}", output_str);
    }

    if args.timing {
        let _ = writeln!(io::stderr(), "elapsed: {}ms", elapsed.as_millis());
    }

    ExitCode::SUCCESS
}
