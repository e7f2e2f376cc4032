mod error;
mod fetch;
mod logging;
mod output;
mod parser;
mod scrape;
mod screen;
mod settings;
mod table;
mod tickers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use fetch::{HttpFetcher, PageFetcher};
use parser::{PageExtractor, QuoteExtractor};
use scrape::ScrapeOptions;
use settings::Settings;

#[derive(Parser)]
#[command(name = "finviz_screener", about = "Value screener over FinViz quote pages")]
struct Cli {
    /// Settings file (default: ./screener.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every constituent, screen and write the dated CSV
    Run {
        /// Max concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
        /// Request timeout in seconds (0 = none)
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Directory holding the log file and screens/
        #[arg(short, long)]
        base_dir: Option<PathBuf>,
        /// Quote page layout version
        #[arg(short, long)]
        layout: Option<String>,
    },
    /// List the normalized constituents
    Tickers,
    /// Scrape one quote page and print its record as JSON
    Quote {
        ticker: String,
        /// Quote page layout version
        #[arg(short, long)]
        layout: Option<String>,
    },
}

struct RunSummary {
    tickers: usize,
    scraped: usize,
    failed: usize,
    screened: usize,
    output: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run {
            workers,
            timeout,
            base_dir,
            layout,
        } => {
            if let Some(w) = workers {
                settings.max_workers = w;
            }
            if let Some(t) = timeout {
                settings.request_timeout_secs = t;
            }
            if let Some(dir) = base_dir {
                settings.base_dir = dir;
            }
            if let Some(l) = layout {
                settings.layout = l;
            }
            settings.validate()?;

            let log = logging::RunLog::create(&settings.log_path())?;
            let _guard = log.install();
            println!("Logging to {}", log.path().display());

            let summary = run_screener(&settings).await?;
            println!(
                "Scraped {} of {} tickers ({} failed), {} pass the screen.",
                summary.scraped, summary.tickers, summary.failed, summary.screened
            );
            println!("Wrote {}", summary.output.display());
            Ok(())
        }
        Commands::Tickers => {
            logging::init_console();
            let client = tickers::source_client(settings.timeout())?;
            let symbols = tickers::fetch_constituents(&client, &settings.constituents_url).await?;
            for s in &symbols {
                println!("{}", s);
            }
            println!("\n{} tickers", symbols.len());
            Ok(())
        }
        Commands::Quote { ticker, layout } => {
            logging::init_console();
            if let Some(l) = layout {
                settings.layout = l;
            }
            settings.validate()?;

            let ticker = tickers::normalize_ticker(&ticker);
            let url = settings.quote_url.replace("{}", &ticker);
            let fetcher = HttpFetcher::new(settings.timeout())?;
            let extractor = QuoteExtractor::new(settings.quote_layout()?)?;
            let body = fetcher.fetch(&url).await?;
            let record = extractor.extract(&ticker, &body, &settings.schema()?)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Constituents → scrape → aggregate → screen → CSV.
async fn run_screener(settings: &Settings) -> anyhow::Result<RunSummary> {
    info!(
        "====================== SCREENER {} ======================",
        settings.universe.to_uppercase()
    );

    info!("Retrieving constituents");
    let client = tickers::source_client(settings.timeout())?;
    let symbols = tickers::fetch_constituents(&client, &settings.constituents_url)
        .await
        .context("Could not retrieve the ticker universe")?;
    let items = tickers::work_items(&symbols, &settings.quote_url);

    let fetcher = Arc::new(HttpFetcher::new(settings.timeout())?);
    let schema = Arc::new(settings.schema()?);
    let layout = settings.quote_layout()?;
    let extractor = Arc::new(QuoteExtractor::new(layout)?);
    info!("Running screener on layout {}, starting workers", layout.version);

    let opts = ScrapeOptions {
        max_workers: settings.max_workers,
        show_progress: true,
    };
    let report = scrape::run(items, &opts, fetcher, extractor, Arc::clone(&schema)).await;
    let scraped = report.results.len();
    let failed = report.failures.len();

    let table = table::aggregate(report.results, &schema);
    let screened = screen::apply(table, &settings.criteria, &settings.sort_spec())?;

    let path = output::screen_path(
        &settings.base_dir,
        &settings.universe,
        chrono::Local::now().date_naive(),
    );
    output::write_csv(&path, &screened)?;
    info!(
        "The screen found {} securities answering to the criteria, saved to {}",
        screened.rows.len(),
        path.display()
    );

    Ok(RunSummary {
        tickers: symbols.len(),
        scraped,
        failed,
        screened: screened.rows.len(),
        output: path,
    })
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONSTITUENTS: &str = r#"<html><body>
        <table class="wikitable sortable">
          <tr><th>Symbol</th><th>Security</th></tr>
          <tr><td>AAPL</td><td>Apple Inc.</td></tr>
          <tr><td>BRK.B</td><td>Berkshire Hathaway</td></tr>
          <tr><td>GONE</td><td>Delisted Corp.</td></tr>
        </table></body></html>"#;

    async fn quote(server: &MockServer, ticker: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/quote.ashx"))
            .and(query_param("t", ticker))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn screens_a_mock_universe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/constituents"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CONSTITUENTS))
            .mount(&server)
            .await;

        let aapl = std::fs::read_to_string("tests/fixtures/finviz_2017_aapl.html").unwrap();
        let brk = aapl
            .replace(r#"id="ticker">AAPL<"#, r#"id="ticker">BRK-B<"#)
            .replace("5.79", "1.20");
        quote(&server, "AAPL", ResponseTemplate::new(200).set_body_string(aapl)).await;
        quote(&server, "BRK-B", ResponseTemplate::new(200).set_body_string(brk)).await;
        quote(&server, "GONE", ResponseTemplate::new(404)).await;

        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            constituents_url: format!("{}/wiki/constituents", server.uri()),
            quote_url: format!("{}/quote.ashx?t={{}}", server.uri()),
            base_dir: dir.path().to_path_buf(),
            max_workers: 4,
            request_timeout_secs: 5,
            ..Default::default()
        };
        settings.validate().unwrap();

        let summary = run_screener(&settings).await.unwrap();
        assert_eq!(summary.tickers, 3);
        assert_eq!(summary.scraped, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.screened, 1);
        assert!(summary.output.starts_with(dir.path().join("screens")));

        let csv = std::fs::read_to_string(&summary.output).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Ticker,Market Cap,Price,P/E,PEG,P/B,Quick Ratio,Debt/Eq,ROI,ROE,EPS Q/Q,Insider Own,Dividend %",
                "BRK-B,801.72,153.06,18.11,,1.2,1.21,0.68,18.3,35.3,10.3,0.06,1.65",
            ]
        );
    }

    #[test]
    fn formats_durations() {
        use std::time::Duration;
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
