use apply_compose::{
    ApplyParser, CaseInsensitivePropertyResolver, DefaultQuerySettings, DynamicQueryOption,
    HandleNullPropagation, Model, Path, PropertyResolver, QueryContext, QuerySettings, Queryable,
    ServiceScope,
};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

/// Apply an `$apply` clause to a JSON array of rows.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON file holding an array of rows.
    #[arg(long)]
    data: PathBuf,
    /// The clause, e.g. "groupby((Category), aggregate(Amount with sum as Total))"
    #[arg(long = "apply")]
    clause: String,
    /// JSON type model; enables property checks against --path.
    #[arg(long, requires = "path")]
    model: Option<PathBuf>,
    /// Resource path into the model, e.g. "Products".
    #[arg(long, requires = "model")]
    path: Option<String>,
    /// JSON file with per-call query settings.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// JSON file with default query settings, registered in the service scope.
    #[arg(long)]
    defaults: Option<PathBuf>,
    /// Override member binding with a case-insensitive resolver.
    #[arg(long)]
    case_insensitive: bool,
    /// Fail on member access through null instead of propagating it.
    #[arg(long)]
    strict_nulls: bool,
    /// Check the clause against the default query settings before applying.
    #[arg(long)]
    validate: bool,
    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn read_json<T: DeserializeOwned>(path: &PathBuf) -> Result<T, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))
}

/// The scope this binary hosts for every query. Settings are always
/// registered since a hosted context requires them.
fn host_scope(defaults: DefaultQuerySettings, case_insensitive: bool) -> Arc<ServiceScope> {
    let scope = Arc::new(ServiceScope::new());
    scope.register(defaults);
    if case_insensitive {
        let resolver: Arc<dyn PropertyResolver> = Arc::new(CaseInsensitivePropertyResolver);
        scope.register(resolver);
    }
    scope
}

fn run(args: Args) -> Result<Value, String> {
    let rows: Vec<Value> = read_json(&args.data)?;

    let path = match (&args.model, &args.path) {
        (Some(model), Some(text)) => Some(Path::parse(Arc::new(read_json::<Model>(model)?), text)),
        _ => None,
    };
    let context = Arc::new(QueryContext::new(path));

    let defaults = match &args.defaults {
        Some(p) => read_json::<DefaultQuerySettings>(p)?,
        None => DefaultQuerySettings::default(),
    };
    // the scope must outlive the option; the context only holds it weakly
    let scope = host_scope(defaults, args.case_insensitive);
    context.attach_service_scope(&scope);

    let mut settings: QuerySettings = match &args.settings {
        Some(p) => read_json(p)?,
        None => QuerySettings::default(),
    };
    if args.strict_nulls {
        settings.handle_null_propagation = HandleNullPropagation::False;
    }

    let parser = Arc::new(ApplyParser::for_context(&context));
    let option = DynamicQueryOption::new(args.clause, context, parser).map_err(|e| e.to_string())?;
    if args.validate {
        option.validate().map_err(|e| e.to_string())?;
    }
    let rows = option
        .apply_to(&Queryable::from_rows(rows), &settings)
        .and_then(|q| q.execute())
        .map_err(|e| e.to_string())?;
    Ok(Value::Array(rows))
}

fn main() {
    // Parse CLI arguments.
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(out) => match serde_json::to_string_pretty(&out) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
