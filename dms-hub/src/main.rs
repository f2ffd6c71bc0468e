//! Maintenance command line for the DMS collection hub.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dms_hub_core::{
    auth::{Role, User},
    config::DmsConfig,
    search::SearchIndex,
    types::{CollectionNode, UserId},
    CollectionUpdate, DmsHub, NewCollection,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "dms-hub")]
#[command(about = "Manage DMS collections from the command line")]
struct Cli {
    /// Act as this user id; commands run with every capability
    #[arg(short, long, global = true, default_value_t = 1)]
    user: UserId,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum VisibilityArg {
    Public,
    Private,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a collection
    CreateCollection {
        name: String,

        #[arg(short, long)]
        parent: Option<Uuid>,

        /// Create an institution collection
        #[arg(long)]
        public: bool,

        #[arg(short, long)]
        color: Option<String>,
    },

    /// Rename or recolor a collection
    Update {
        id: Uuid,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        color: Option<String>,
    },

    /// Print the personal collection tree of the user
    Tree,

    /// Move a collection below another one, or to the root level
    Move {
        id: Uuid,

        #[arg(short, long)]
        below: Option<Uuid>,

        /// Merge into a same-named collection at the destination
        #[arg(short, long)]
        merge: bool,
    },

    /// Copy a collection below another one, or to the root level
    Copy {
        id: Uuid,

        #[arg(short, long)]
        under: Option<Uuid>,

        #[arg(short, long)]
        merge: bool,
    },

    /// Trash a collection
    Delete {
        id: Uuid,

        /// Remove the collection for good
        #[arg(long)]
        permanent: bool,
    },

    /// Restore a trashed collection
    Restore { id: Uuid },

    /// Make a collection public or private
    Visibility { id: Uuid, visibility: VisibilityArg },

    /// Report duplicated document memberships, removing them with --yes
    CleanDuplicates {
        #[arg(short, long)]
        yes: bool,
    },

    /// Recreate a folder hierarchy as nested collections
    ImportFolder {
        path: PathBuf,

        #[arg(long)]
        public: bool,
    },

    /// Push the documents of a collection to the index again
    Reindex { id: Uuid },

    /// Full-text search over the local index
    Search {
        query: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// List trashed collections and documents
    Trash,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DmsConfig::from_env()?;
    let actor = User::with_role(cli.user, Role::Admin);

    if let Commands::Search { query, limit } = &cli.command {
        let index = SearchIndex::new(&config.index_dir)?;
        for id in index.search(query, *limit)? {
            println!("{id}");
        }
        return Ok(());
    }

    let hub = DmsHub::open(&config)?;
    info!(institution = hub.institution(), user = actor.id, "dms hub ready");

    match cli.command {
        Commands::CreateCollection {
            name,
            parent,
            public,
            color,
        } => {
            let mut request = if public {
                NewCollection::public(name)
            } else {
                NewCollection::private(name)
            };
            request.parent = parent;
            request.color = color;
            let created = hub.create_collection(&actor, request)?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Commands::Update { id, name, color } => {
            let updated = hub.update_collection(&actor, id, CollectionUpdate { name, color })?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        Commands::Tree => {
            for node in hub.collection_tree(&actor) {
                print_node(&node, 0);
            }
        }
        Commands::Move { id, below, merge } => {
            let moved = hub.move_collection(&actor, id, below, merge)?;
            println!("{}", serde_json::to_string_pretty(&moved)?);
        }
        Commands::Copy { id, under, merge } => {
            let copy = hub.copy_collection(&actor, id, under, merge)?;
            println!("{}", serde_json::to_string_pretty(&copy)?);
        }
        Commands::Delete { id, permanent } => {
            if permanent {
                hub.permanently_delete_collection(id, &actor)?;
            } else {
                hub.delete_collection(&actor, id)?;
            }
            println!("deleted {id}");
        }
        Commands::Restore { id } => {
            let restored = hub.restore_collection(&actor, id)?;
            println!("{}", serde_json::to_string_pretty(&restored)?);
        }
        Commands::Visibility { id, visibility } => {
            let updated = match visibility {
                VisibilityArg::Public => hub.make_collection_public(&actor, id)?,
                VisibilityArg::Private => hub.make_collection_private(&actor, id)?,
            };
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        Commands::CleanDuplicates { yes } => {
            let duplicates = hub.duplicate_memberships();
            if duplicates.is_empty() {
                println!("no duplicated memberships");
            }
            for (collection, surplus) in duplicates {
                if yes {
                    let removed = hub.clean_duplicate_memberships(&actor, collection)?;
                    println!("{collection}: removed {removed} duplicated rows");
                } else {
                    println!("{collection}: {surplus} duplicated rows (dry run, pass --yes to remove)");
                }
            }
        }
        Commands::ImportFolder { path, public } => {
            let import = hub.import_folder(&actor, &path, true, true, !public)?;
            println!(
                "imported {} folders into {} ({})",
                import.directories, import.root.name, import.root.id
            );
        }
        Commands::Reindex { id } => {
            let count = hub.reindex_collection(&actor, id)?;
            println!("reindexed {count} documents");
        }
        Commands::Trash => {
            for collection in hub.user_trash(&actor) {
                println!("collection {} {}", collection.id, collection.name);
            }
            for document in hub.trashed_documents(&actor) {
                println!("document {} {}", document.id, document.title);
            }
        }
        Commands::Search { .. } => bail!("search is handled before the hub is opened"),
    }

    Ok(())
}

fn print_node(node: &CollectionNode, depth: usize) {
    println!(
        "{}{} ({})",
        "  ".repeat(depth),
        node.collection.name,
        node.collection.id
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
