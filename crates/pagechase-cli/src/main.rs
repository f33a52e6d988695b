use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use pagechase_crawler::{
    ArtifactStrategy, Ceiling, CrawlerConfig, Fetcher, FsSink, HttpFetcher, Mode,
    NextLocatorStrategy, Walker,
};
use tokio::runtime;

mod strategies;

use strategies::{PageContent, RelLink};

/// Page-chasing crawler
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[clap(name = "walk")]
    Walk(WalkArgs),
    #[clap(name = "probe")]
    Probe(ProbeArgs),
    #[clap(hide = true)]
    Completion,
}

/// Follow pages from a start URL and persist their content
#[derive(Debug, clap::Args)]
pub struct WalkArgs {
    /// URL of the first page
    pub start: String,
    /// Directory where artifacts are written
    #[clap(parse(from_os_str), long, short)]
    pub output_dir: Option<PathBuf>,
    /// Optional default crawler yaml configuration file
    #[clap(env = "PAGECHASE_CRAWLER_CONFIG", parse(from_os_str), long)]
    pub crawler_config: Option<PathBuf>,
    /// Override crawler's user agent
    #[clap(long)]
    pub user_agent: Option<String>,
    /// Override crawler's walking mode
    #[clap(arg_enum, long)]
    pub mode: Option<Mode>,
    /// Override crawler's maximum number of concurrent chain steps
    #[clap(long)]
    pub max_concurrent: Option<Ceiling>,
    #[clap(flatten)]
    pub strategies: StrategyArgs,
    /// When quiet no logs are outputted
    #[clap(long, short)]
    pub quiet: bool,
}

/// How pages are turned into a next URL and an artifact
#[derive(Debug, clap::Args)]
pub struct StrategyArgs {
    /// `rel` token of the link leading to the next page
    #[clap(long, default_value = "next")]
    pub next_rel: String,
    /// Only persist elements having this class (whole page otherwise)
    #[clap(long)]
    pub content_class: Option<String>,
    /// Name artifacts after the last URL path segment instead of a counter
    #[clap(long)]
    pub name_from_url: bool,
}

impl TryFrom<&WalkArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &WalkArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.crawler_config.as_ref().map(fs_err::File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            CrawlerConfig::default()
        };
        if let Some(output_dir) = &args.output_dir {
            conf.output_dir = output_dir.clone();
        }
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(mode) = args.mode {
            conf.mode = mode;
        }
        if let Some(max_concurrent) = args.max_concurrent {
            conf.max_concurrent = max_concurrent;
        }
        Ok(conf)
    }
}

pub fn walk(args: WalkArgs) -> anyhow::Result<()> {
    let conf: CrawlerConfig = (&args).try_into()?;
    fs_err::create_dir_all(&conf.output_dir)?;

    let sink = FsSink::new(&conf.output_dir);
    log::info!("Writing artifacts to {}", sink.root().display());

    let walker = Walker::new(HttpFetcher::new(&conf)?, sink)
        .with_next_locator(RelLink::from(&args.strategies))
        .with_artifact(PageContent::from(&args.strategies))
        .with_admission_backoff(conf.admission);

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(walker.walk(args.start, &conf))?;
    Ok(())
}

/// Fetch a single page and print what a walk would do with it
#[derive(Debug, clap::Args)]
pub struct ProbeArgs {
    /// URL of the page to probe
    pub url: String,
    /// Custom user agent to download the page
    #[clap(long)]
    pub ua: Option<String>,
    #[clap(flatten)]
    pub strategies: StrategyArgs,
}

pub fn probe(args: ProbeArgs) -> anyhow::Result<()> {
    let mut conf = CrawlerConfig::default();
    if let Some(ua) = args.ua {
        conf.user_agent = ua;
    }
    let fetcher = HttpFetcher::new(&conf)?;
    let next = RelLink::from(&args.strategies);
    let content = PageContent::from(&args.strategies);

    let rt = runtime::Builder::new_current_thread().enable_all().build()?;
    rt.block_on(async move {
        let page = fetcher.fetch(&args.url).await?;
        println!("locator\t{}", page.locator);

        let next = next.next_locator(&page).await?;
        println!("next\t{}", next.as_deref().unwrap_or("-"));

        match content.artifact(&page).await? {
            Some(artifact) => println!(
                "artifact\t{} ({} bytes)",
                artifact.name.as_deref().unwrap_or("<index>"),
                artifact.payload.len()
            ),
            None => println!("artifact\t-"),
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Walk(args) => {
            if !args.quiet {
                let env = env_logger::Env::default()
                    .default_filter_or("pagechase=info,pagechase_crawler=info");
                env_logger::Builder::from_env(env).init();
            }
            walk(args)
        }
        SubCommand::Probe(args) => {
            let env = env_logger::Env::default().default_filter_or("pagechase=warn");
            env_logger::Builder::from_env(env).init();
            probe(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "pagechase", &mut io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_args(argv: &[&str]) -> WalkArgs {
        match Args::try_parse_from(argv).unwrap().cmd {
            SubCommand::Walk(args) => args,
            other => panic!("Unexpected subcommand: {other:?}"),
        }
    }

    #[test]
    fn overrides_apply_on_defaults() {
        let args = walk_args(&[
            "pagechase",
            "walk",
            "https://blog.example/",
            "--mode",
            "sequential",
            "--max-concurrent",
            "3",
            "-o",
            "out",
        ]);

        let conf = CrawlerConfig::try_from(&args).unwrap();

        assert_eq!(conf.mode, Mode::Sequential);
        assert_eq!(conf.max_concurrent.get(), 3);
        assert_eq!(conf.output_dir, PathBuf::from("out"));
        assert_eq!(conf.user_agent, "pagechaseBot");
        assert_eq!(args.strategies.next_rel, "next");
    }

    #[test]
    fn non_numeric_ceiling_is_refused() {
        let res = Args::try_parse_from([
            "pagechase",
            "walk",
            "https://blog.example/",
            "--max-concurrent",
            "five",
        ]);

        assert!(res.is_err());
    }

    #[test]
    fn yaml_file_is_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawler.yaml");
        fs_err::write(&path, "userAgent: fromFile\nmaxConcurrent: 7\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        let args = walk_args(&[
            "pagechase",
            "walk",
            "https://blog.example/",
            "--crawler-config",
            &path,
            "--user-agent",
            "fromFlag",
        ]);
        let conf = CrawlerConfig::try_from(&args).unwrap();

        assert_eq!(conf.user_agent, "fromFlag");
        assert_eq!(conf.max_concurrent.get(), 7);
    }
}
