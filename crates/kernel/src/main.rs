//! Rowsift command-line interface.
//!
//! Lists entities from PostgreSQL, prints compiled SQL, or dumps the schema
//! catalog.

use std::collections::HashMap;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rowsift_kernel::config::Config;
use rowsift_kernel::listing::{
    OutputShape, TreeShape, compile_list, effective_search_fields, list_records,
    parse_list_params,
};
use rowsift_kernel::schema::{EntitySchema, SchemaRegistry};
use rowsift_kernel::{ListError, ListContext};

#[derive(Parser, Debug)]
#[command(name = "rowsift", about = "Schema-driven listing over PostgreSQL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List records of an entity and print the response envelope
    List(ListArgs),

    /// Print the count and page SQL a listing would run
    Sql(QueryArgs),

    /// Print the loaded schema catalog
    Schema,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Entity name from the schema catalog
    entity: String,

    /// Raw listing parameter, e.g. -p page=2 -p 'columnFilters=[["title","car"]]'
    #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// Field path to search; repeat for several (default: the entity's own)
    #[arg(long = "search-field")]
    search_fields: Vec<String>,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Relationship path to embed in each row; repeat for several
    #[arg(long = "include")]
    includes: Vec<String>,

    /// Keep only these top-level fields
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["omit", "tree"])]
    fields: Vec<String>,

    /// Drop these top-level fields
    #[arg(long, value_delimiter = ',', conflicts_with = "tree")]
    omit: Vec<String>,

    /// Rebuild the rows into a parent/child forest (id / parent_id)
    #[arg(long)]
    tree: bool,
}

impl ListArgs {
    fn output_shape(&self) -> OutputShape {
        if self.tree {
            OutputShape::Tree(TreeShape::default())
        } else if !self.fields.is_empty() {
            OutputShape::Fields(self.fields.clone())
        } else if !self.omit.is_empty() {
            OutputShape::Omit(self.omit.clone())
        } else {
            OutputShape::Rows
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    match cli.command {
        Command::List(args) => run_list(&config, args).await,
        Command::Sql(args) => run_sql(&config, &args),
        Command::Schema => run_schema(&config),
    }
}

async fn run_list(config: &Config, args: ListArgs) -> Result<ExitCode> {
    let ctx = ListContext::connect(config)
        .await
        .context("failed to initialize listing context")?;

    let params: HashMap<String, String> = args.query.params.iter().cloned().collect();
    let shape = args.output_shape();
    let outcome = list_records(
        &ctx,
        &args.query.entity,
        &params,
        &args.query.search_fields,
        &args.includes,
        &shape,
    )
    .await;

    ctx.close().await;

    match outcome {
        Ok(outcome) => {
            let found = outcome.is_found();
            info!(entity = %args.query.entity, found, "listing complete");
            let response = outcome.into_response(&args.query.entity);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report(err),
    }
}

fn run_sql(config: &Config, args: &QueryArgs) -> Result<ExitCode> {
    let registry = SchemaRegistry::load_file(&config.schema_path)?;
    let params: HashMap<String, String> = args.params.iter().cloned().collect();

    let compiled = registry.entity(&args.entity).and_then(|schema| {
        let (filters, pagination) = parse_list_params(&params, config.limits())?;
        let fields = effective_search_fields(&schema, &args.search_fields);
        compile_list(&registry, &schema, &filters, fields, pagination)
    });

    match compiled {
        Ok(compiled) => {
            println!("-- count\n{};", compiled.count_sql());
            println!("-- page\n{};", compiled.page_sql());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report(err),
    }
}

fn run_schema(config: &Config) -> Result<ExitCode> {
    let registry = SchemaRegistry::load_file(&config.schema_path)?;
    let entities: Vec<EntitySchema> = registry
        .names()
        .into_iter()
        .filter_map(|name| registry.get(name))
        .map(|schema| (*schema).clone())
        .collect();
    println!("{}", serde_json::to_string_pretty(&entities)?);
    Ok(ExitCode::SUCCESS)
}

/// Client errors print and exit with status 2; anything else is fatal.
fn report(err: ListError) -> Result<ExitCode> {
    if !err.is_client_error() {
        bail!(err);
    }
    warn!(error = %err, "listing rejected");
    eprintln!("error: {err}");
    Ok(ExitCode::from(2))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_params() {
        assert_eq!(
            parse_key_value("page=2").unwrap(),
            ("page".to_string(), "2".to_string())
        );
        assert_eq!(
            parse_key_value(r#"columnFilters=[["title","a=b"]]"#).unwrap().1,
            r#"[["title","a=b"]]"#
        );
        assert!(parse_key_value("page").is_err());
        assert!(parse_key_value("=2").is_err());
    }

    #[test]
    fn output_shape_from_flags() {
        let cli = Cli::parse_from(["rowsift", "list", "user", "--omit", "password,email"]);
        let Command::List(args) = cli.command else {
            panic!("expected list command");
        };
        assert_eq!(
            args.output_shape(),
            OutputShape::Omit(vec!["password".to_string(), "email".to_string()])
        );

        let cli = Cli::parse_from(["rowsift", "list", "category", "--tree"]);
        let Command::List(args) = cli.command else {
            panic!("expected list command");
        };
        assert_eq!(args.output_shape(), OutputShape::Tree(TreeShape::default()));
    }

    #[test]
    fn conflicting_shapes_rejected() {
        let result = Cli::try_parse_from(["rowsift", "list", "user", "--fields", "id", "--tree"]);
        assert!(result.is_err());
    }
}
