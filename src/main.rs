use std::path::Path;

use chrono::Utc;
use clap::Parser;
use mangashelf::{
    CatalogDb,
    DataDir,
    Error,
    Result,
    catalog_db::TitleListQuery,
    cli::{self, Cli, Command, TitleAction},
    config::ServerConfig,
    mcp,
    model::NewTitle,
    search::{self, SearchRequest},
    server,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("MANGASHELF_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let catalog = CatalogDb::open(&data_dir.catalog_db())?;

    match cli.command {
        Command::Serve(args) => {
            let config =
                ServerConfig::new(args.bind, args.request_timeout_secs)?;
            cmd_serve(catalog, config)?;
        }
        Command::Search(args) => {
            cmd_search(&catalog, &args)?;
        }
        Command::Title { action } => match action {
            TitleAction::Import { file } => {
                title_import(&catalog, &file)?;
            }
            TitleAction::List { json } => {
                title_list(&catalog, json)?;
            }
            TitleAction::Remove { id } => {
                title_remove(&catalog, &id)?;
            }
        },
        Command::Mcp => {
            mcp::run_mcp(catalog)?;
        }
        Command::Status(args) => {
            cmd_status(&catalog, &data_dir, args.json)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_serve(catalog: CatalogDb, config: ServerConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(server::serve(catalog, config))
}

fn cmd_search(catalog: &CatalogDb, args: &cli::SearchArgs) -> Result<()> {
    let request = SearchRequest::new(
        Some(args.query.as_str()),
        Some(args.page),
        Some(args.limit),
    )?;
    let page = search::execute_search(
        catalog,
        &request,
        &CancellationToken::new(),
        Utc::now(),
    )?;

    if args.json {
        search::format_json(&page)?;
    } else {
        search::format_human(&page);
    }
    Ok(())
}

fn title_import(catalog: &CatalogDb, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)?;
    let titles: Vec<NewTitle> = serde_json::from_str(&raw)?;

    let mut imported = 0;
    let mut skipped = 0;
    for input in titles {
        let name = input.title.clone();
        match catalog.create_title(input) {
            Ok(_) => imported += 1,
            Err(e @ (Error::Conflict(_) | Error::InvalidRequest(_))) => {
                tracing::warn!(title = %name, error = %e, "skipping title");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    println!("Imported {imported} title(s), skipped {skipped}");
    Ok(())
}

fn title_list(catalog: &CatalogDb, json: bool) -> Result<()> {
    let list = catalog.list_titles(&TitleListQuery {
        limit: usize::MAX,
        ..Default::default()
    })?;

    if json {
        println!("{}", serde_json::to_string(&list.items)?);
    } else if list.items.is_empty() {
        println!("No titles in the catalog.");
    } else {
        for title in &list.items {
            println!(
                "{}\t{}\t{}\t{}",
                title.id,
                title.title,
                title.status,
                title.last_updated.format("%Y-%m-%d")
            );
        }
    }
    Ok(())
}

fn title_remove(catalog: &CatalogDb, id: &str) -> Result<()> {
    if !catalog.remove_title(id)? {
        return Err(Error::NotFound {
            kind: "title",
            name: id.to_string(),
        });
    }
    println!("Removed title '{id}'");
    Ok(())
}

fn cmd_status(
    catalog: &CatalogDb,
    data_dir: &DataDir,
    json: bool,
) -> Result<()> {
    let counts = catalog.counts()?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "dataDir": data_dir.root(),
                "counts": counts,
            })
        );
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Titles: {}", counts.titles);
        println!("Chapters: {}", counts.chapters);
        println!("Ratings: {}", counts.ratings);
        println!("Bookmarks: {}", counts.bookmarks);
    }
    Ok(())
}
