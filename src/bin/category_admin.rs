use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use stateset_category_tree::{
    config::{self, AppConfig},
    db,
    entities::CategoryModel,
    events::{Event, EventSender},
    services::category_tree::{
        CategoryTreeNode, CategoryTreeService, CreateCategoryInput, DeleteOptions,
        ImportCategory, UpdateCategoryInput,
    },
    tree::Position,
};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Tree(args) => handle_tree(&context, args, cli.json).await?,
        Commands::Show(args) => handle_show(&context, args, cli.json).await?,
        Commands::Create(args) => handle_create(&context, args, cli.json).await?,
        Commands::Rename(args) => handle_rename(&context, args, cli.json).await?,
        Commands::Move(args) => handle_move(&context, args, cli.json).await?,
        Commands::Delete(args) => handle_delete(&context, args, cli.json).await?,
        Commands::Verify => handle_verify(&context, cli.json).await?,
        Commands::Rebuild => handle_rebuild(&context, cli.json).await?,
        Commands::Import(args) => handle_import(&context, args, cli.json).await?,
        Commands::Purge => handle_purge(&context, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "category-admin",
    about = "Maintenance CLI for the nested-set category tree",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the forest, or one subtree
    Tree(TreeArgs),
    /// Show one category with its ancestors
    Show(ShowArgs),
    Create(CreateArgs),
    Rename(RenameArgs),
    /// Move a category and its subtree
    Move(MoveArgs),
    /// Soft delete a subtree, or hard delete with --hard
    Delete(DeleteArgs),
    /// Report structural violations without changing anything
    Verify,
    /// Renumber every live row from stored parent links
    Rebuild,
    /// Merge a JSON array of categories into the tree and renumber
    Import(ImportArgs),
    /// Physically remove soft-deleted rows
    Purge,
}

#[derive(Args)]
struct TreeArgs {
    #[arg(long, help = "Only print the subtree under this category")]
    root: Option<Uuid>,
}

#[derive(Args)]
struct ShowArgs {
    #[arg(long, conflicts_with_all = ["slug", "path"])]
    id: Option<Uuid>,
    #[arg(long, conflicts_with = "path")]
    slug: Option<String>,
    #[arg(long)]
    path: Option<String>,
}

#[derive(Args)]
struct CreateArgs {
    #[arg(long)]
    name: String,
    #[arg(long, help = "Explicit slug; derived from the name otherwise")]
    slug: Option<String>,
    #[arg(long, help = "Parent category id; creates a root when omitted")]
    parent: Option<Uuid>,
    #[arg(long, default_value = "last", help = "first or last among siblings")]
    position: Position,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    hidden: bool,
}

#[derive(Args)]
struct RenameArgs {
    #[arg(long)]
    id: Uuid,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    slug: Option<String>,
    #[arg(long, help = "Version the caller last read")]
    expected_version: i32,
}

#[derive(Args)]
struct MoveArgs {
    #[arg(long)]
    id: Uuid,
    #[arg(long, help = "New parent; moves to root level when omitted")]
    parent: Option<Uuid>,
    #[arg(long, default_value = "last")]
    position: Position,
}

#[derive(Args)]
struct DeleteArgs {
    #[arg(long)]
    id: Uuid,
    #[arg(long, action = ArgAction::SetTrue, help = "Remove rows and compact boundaries")]
    hard: bool,
}

#[derive(Args)]
struct ImportArgs {
    #[arg(help = "Path to a JSON array of category rows")]
    file: PathBuf,
}

struct CliContext {
    _config: AppConfig,
    service: CategoryTreeService,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        if config.auto_migrate {
            db::run_migrations(&db_pool)
                .await
                .context("failed to run migrations")?;
        }

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(config.event_channel_capacity);
        let event_sender = Arc::new(EventSender::new(event_tx));

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "category_admin", event = ?event, "received category event");
            }
        });

        let service = CategoryTreeService::new(
            Arc::new(db_pool),
            event_sender,
            config.category_tree.clone(),
        );

        Ok(Self {
            _config: config,
            service,
        })
    }
}

async fn handle_tree(context: &CliContext, args: TreeArgs, json: bool) -> Result<()> {
    let forest = context
        .service
        .get_tree(args.root)
        .await
        .context("failed to load category tree")?;

    if json {
        print_json(&forest)?;
    } else if forest.is_empty() {
        println!("No categories");
    } else {
        for node in &forest {
            render_tree_node(node);
        }
    }
    Ok(())
}

async fn handle_show(context: &CliContext, args: ShowArgs, json: bool) -> Result<()> {
    let service = &context.service;
    let category = match (args.id, args.slug, args.path) {
        (Some(id), _, _) => service.get(id).await,
        (None, Some(slug), _) => service.get_by_slug(&slug).await,
        (None, None, Some(path)) => service.get_by_path(&path).await,
        (None, None, None) => return Err(anyhow!("one of --id, --slug or --path is required")),
    }
    .context("failed to load category")?;

    let ancestors = service.get_ancestors(category.id).await?;
    let descendants = service.count_descendants(category.id).await?;

    if json {
        #[derive(Serialize)]
        struct Details<'a> {
            category: &'a CategoryModel,
            ancestors: &'a [CategoryModel],
            descendants: u64,
        }
        print_json(&Details {
            category: &category,
            ancestors: &ancestors,
            descendants,
        })?;
    } else {
        render_category(&category);
        let trail: Vec<&str> = ancestors.iter().map(|a| a.name.as_str()).collect();
        if !trail.is_empty() {
            println!("  ancestors: {}", trail.join(" > "));
        }
        println!("  descendants: {}", descendants);
    }
    Ok(())
}

async fn handle_create(context: &CliContext, args: CreateArgs, json: bool) -> Result<()> {
    let mut input = CreateCategoryInput::named(args.name).at(args.position);
    input.slug = args.slug;
    input.description = args.description;
    input.is_visible = !args.hidden;

    let category = context
        .service
        .create(input, args.parent)
        .await
        .context("failed to create category")?;

    if json {
        print_json(&category)?;
    } else {
        println!("Created category {}", category.id);
        render_category(&category);
    }
    Ok(())
}

async fn handle_rename(context: &CliContext, args: RenameArgs, json: bool) -> Result<()> {
    if args.name.is_none() && args.slug.is_none() {
        return Err(anyhow!("nothing to change: pass --name and/or --slug"));
    }
    let input = UpdateCategoryInput {
        expected_version: args.expected_version,
        name: args.name,
        slug: args.slug,
        ..Default::default()
    };

    let category = context
        .service
        .update(args.id, input)
        .await
        .context("failed to update category")?;

    if json {
        print_json(&category)?;
    } else {
        render_category(&category);
    }
    Ok(())
}

async fn handle_move(context: &CliContext, args: MoveArgs, json: bool) -> Result<()> {
    let outcome = context
        .service
        .move_category(args.id, args.parent, args.position)
        .await
        .context("failed to move category")?;

    if json {
        print_json(&outcome)?;
    } else if outcome.affected == 0 {
        println!("Category {} already in place", outcome.category.id);
    } else {
        println!(
            "Moved {} ({} rows): {} -> {}",
            outcome.category.id, outcome.affected, outcome.old_path, outcome.category.path
        );
    }
    Ok(())
}

async fn handle_delete(context: &CliContext, args: DeleteArgs, json: bool) -> Result<()> {
    let affected = context
        .service
        .delete(args.id, DeleteOptions { hard: args.hard })
        .await
        .context("failed to delete category")?;

    if json {
        print_json(&serde_json::json!({ "id": args.id, "hard": args.hard, "affected": affected }))?;
    } else {
        let verb = if args.hard { "Removed" } else { "Soft deleted" };
        println!("{} {} categories", verb, affected);
    }
    Ok(())
}

async fn handle_verify(context: &CliContext, json: bool) -> Result<()> {
    let violations = context
        .service
        .verify_tree()
        .await
        .context("failed to verify category tree")?;

    if json {
        print_json(&violations)?;
    } else if violations.is_empty() {
        println!("Category tree is consistent");
    } else {
        for violation in &violations {
            println!(
                "- {} • {} • {}",
                violation.node_id, violation.kind, violation.detail
            );
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} integrity violations found", violations.len()))
    }
}

async fn handle_rebuild(context: &CliContext, json: bool) -> Result<()> {
    let summary = context
        .service
        .rebuild_from_storage()
        .await
        .context("failed to rebuild category tree")?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Renumbered {} categories ({} updated)",
            summary.nodes, summary.updated
        );
    }
    Ok(())
}

async fn handle_import(context: &CliContext, args: ImportArgs, json: bool) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let rows: Vec<ImportCategory> =
        serde_json::from_str(&raw).context("import file is not a JSON array of categories")?;

    let summary = context
        .service
        .rebuild_tree(rows)
        .await
        .context("failed to import categories")?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Imported: {} nodes, {} created, {} updated",
            summary.nodes, summary.created, summary.updated
        );
    }
    Ok(())
}

async fn handle_purge(context: &CliContext, json: bool) -> Result<()> {
    let purged = context
        .service
        .purge_deleted()
        .await
        .context("failed to purge deleted categories")?;

    if json {
        print_json(&serde_json::json!({ "purged": purged }))?;
    } else {
        println!("Purged {} soft-deleted categories", purged);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_category(category: &CategoryModel) {
    println!(
        "- {} • {} • /{} • [{}, {}] level {} • v{}",
        category.id,
        category.name,
        category.path,
        category.left,
        category.right,
        category.level,
        category.version
    );
}

fn render_tree_node(node: &CategoryTreeNode) {
    let indent = "  ".repeat(node.category.level.max(0) as usize);
    let hidden = if node.category.is_visible { "" } else { " (hidden)" };
    println!(
        "{}- {} [{}]{}",
        indent, node.category.name, node.category.slug, hidden
    );
    for child in &node.children {
        render_tree_node(child);
    }
}
