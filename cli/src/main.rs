mod logging;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use config::{PathManager, Settings, load_env_file};
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use stuff_core::{
    Asset, AssetId, AssetStatus, AssetType, FileId, GetAssetQuery, Inventory, ListAssetsQuery,
    ListFilesQuery, ListTagsQuery, OpContext, OrderDir, Upload,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Asset inventory with tags and content-addressed files", long_about = None)]
struct Cli {
    /// Settings file to use instead of the default location
    #[arg(long, global = true, env = "STUFF_CONFIG")]
    config: Option<PathBuf>,

    /// Root for the database, files and logs
    #[arg(long, global = true, env = "STUFF_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log every SQL statement at debug level
    #[arg(long, global = true)]
    debug_sql: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tag allocation
    #[command(subcommand)]
    Tags(TagsCommand),
    /// Asset records
    #[command(subcommand)]
    Assets(AssetsCommand),
    /// Catalogued files
    #[command(subcommand)]
    Files(FilesCommand),
}

#[derive(Subcommand, Debug)]
enum TagsCommand {
    /// Print the next tag that would be handed out
    Next,
    List {
        /// Only tags in use
        #[arg(long, conflicts_with = "unused")]
        in_use: bool,
        /// Only released tags
        #[arg(long)]
        unused: bool,
        #[command(flatten)]
        page: PageArgs,
    },
    Get { tag: String },
    /// Remove a released tag for good
    Delete { tag: String },
}

#[derive(Subcommand, Debug)]
enum AssetsCommand {
    Create {
        /// Tag to use; the next free tag when omitted
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        name: String,
        #[command(flatten)]
        fields: AssetFields,
    },
    Get {
        #[command(flatten)]
        key: AssetKeyArgs,
        /// Include parts, purchases, files, children and parent
        #[arg(long)]
        full: bool,
    },
    List {
        /// Full-text search
        #[arg(long)]
        search: Option<String>,
        /// Column scoped search, e.g. `--field location=shelf`
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        #[arg(long = "type")]
        asset_type: Option<String>,
        #[arg(long)]
        order_by: Option<String>,
        #[arg(long)]
        desc: bool,
        #[command(flatten)]
        page: PageArgs,
    },
    Update {
        #[command(flatten)]
        key: AssetKeyArgs,
        /// Move the asset to another tag
        #[arg(long)]
        new_tag: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: AssetFields,
    },
    Delete {
        #[command(flatten)]
        key: AssetKeyArgs,
    },
}

#[derive(Subcommand, Debug)]
enum FilesCommand {
    List {
        /// Only files owned by this asset id
        #[arg(long)]
        asset: Option<i64>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Attach one or more files to an asset
    Add {
        #[command(flatten)]
        key: AssetKeyArgs,
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,
    },
    /// Delete a file row, and its blob if nothing else references it
    Rm { id: i64 },
    /// Write a file's bytes to stdout
    Cat { id: i64 },
}

#[derive(Args, Debug)]
struct AssetKeyArgs {
    /// Asset tag, or numeric id with --id
    key: String,
    #[arg(long)]
    id: bool,
}

impl AssetKeyArgs {
    fn query(&self) -> Result<GetAssetQuery> {
        if self.id {
            let id: i64 = self.key.parse().context("asset id must be numeric")?;
            Ok(GetAssetQuery::by_id(AssetId::new(id)))
        } else {
            Ok(GetAssetQuery::by_tag(self.key.clone()))
        }
    }
}

#[derive(Args, Debug, Default)]
struct AssetFields {
    #[arg(long = "type")]
    asset_type: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    manufacturer: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    serial_no: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    position_code: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    quantity: Option<u64>,
    /// Image to store and link as the asset's picture
    #[arg(long)]
    image: Option<PathBuf>,
}

impl AssetFields {
    fn apply(&self, asset: &mut Asset) -> Result<()> {
        if let Some(t) = &self.asset_type {
            asset.asset_type = t.parse::<AssetType>().map_err(anyhow::Error::msg)?;
        }
        if let Some(s) = &self.status {
            asset.status = s.parse::<AssetStatus>().map_err(anyhow::Error::msg)?;
        }
        let text = [
            (&self.category, &mut asset.category),
            (&self.manufacturer, &mut asset.manufacturer),
            (&self.model, &mut asset.model),
            (&self.serial_no, &mut asset.serial_no),
            (&self.location, &mut asset.location),
            (&self.position_code, &mut asset.position_code),
            (&self.notes, &mut asset.notes),
        ];
        for (value, field) in text {
            if let Some(value) = value {
                field.clone_from(value);
            }
        }
        if let Some(quantity) = self.quantity {
            asset.quantity = quantity;
        }
        Ok(())
    }

    fn image_upload(&self) -> Result<Option<Upload>> {
        self.image.as_deref().map(open_upload).transpose()
    }
}

#[derive(Args, Debug)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long)]
    page_size: Option<u64>,
}

fn parse_field(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected column=term, got `{s}`"))
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

fn open_upload(path: &Path) -> Result<Upload> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(Upload::new(name, mime_type(path), file))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    if let Some(dir) = &cli.data_dir {
        PathManager::set_data_dir(dir.clone());
    }

    let mut settings = match &cli.config {
        Some(path) => {
            let mut settings = Settings::load_from(path)
                .with_context(|| format!("loading settings from {}", path.display()))?;
            settings.apply_env(|key| std::env::var(key).ok());
            settings
        }
        None => Settings::load().context("loading settings")?,
    };
    if cli.debug_sql {
        settings.database.debug_sql = true;
    }
    Ok(settings)
}

fn run_tags(inventory: &Inventory, ctx: &OpContext<'_>, command: TagsCommand) -> Result<()> {
    match command {
        TagsCommand::Next => print_json(&Value::String(inventory.tags.get_next(ctx)?)),
        TagsCommand::List {
            in_use,
            unused,
            page,
        } => {
            let query = ListTagsQuery {
                in_use: match (in_use, unused) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                page: page.page,
                page_size: page.page_size.unwrap_or_default(),
            };
            print_json(&inventory.tags.list(ctx, &query)?)
        }
        TagsCommand::Get { tag } => match inventory.tags.get(ctx, &tag)? {
            Some(found) => print_json(&found),
            None => bail!("tag {tag} not found"),
        },
        TagsCommand::Delete { tag } => {
            inventory.tags.delete(ctx, &tag)?;
            print_json(&serde_json::json!({ "deleted": tag }))
        }
    }
}

fn run_assets(inventory: &Inventory, ctx: &OpContext<'_>, command: AssetsCommand) -> Result<()> {
    let assets = &inventory.assets;
    match command {
        AssetsCommand::Create { tag, name, fields } => {
            let tag = match tag {
                Some(tag) => tag,
                None => inventory.tags.get_next(ctx)?,
            };
            let mut asset = Asset::new(tag, name);
            fields.apply(&mut asset)?;
            let created = assets.create(ctx, asset, fields.image_upload()?)?;
            print_json(&created)
        }
        AssetsCommand::Get { key, full } => {
            let mut query = key.query()?;
            if full {
                query = query.full();
            }
            print_json(&assets.get(ctx, &query)?)
        }
        AssetsCommand::List {
            search,
            fields,
            asset_type,
            order_by,
            desc,
            page,
        } => {
            let query = ListAssetsQuery {
                search,
                fields,
                asset_type: asset_type
                    .map(|t| t.parse::<AssetType>())
                    .transpose()
                    .map_err(anyhow::Error::msg)?,
                order_by,
                order_dir: if desc { OrderDir::Desc } else { OrderDir::Asc },
                page: page.page,
                page_size: page.page_size.unwrap_or_default(),
                ..Default::default()
            };
            print_json(&assets.list(ctx, &query)?)
        }
        AssetsCommand::Update {
            key,
            new_tag,
            name,
            fields,
        } => {
            // parts and purchases are replaced wholesale, so carry them over
            let current = assets.get(ctx, &key.query()?.with_parts().with_purchases())?;
            let id = current.id;
            let mut asset = current.into_content().into_content();
            if let Some(tag) = new_tag {
                asset.tag = tag;
            }
            if let Some(name) = name {
                asset.name = name;
            }
            fields.apply(&mut asset)?;
            print_json(&assets.update(ctx, id, asset, fields.image_upload()?)?)
        }
        AssetsCommand::Delete { key } => {
            let id = assets.get(ctx, &key.query()?)?.id;
            assets.delete(ctx, id)?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
    }
}

fn run_files(inventory: &Inventory, ctx: &OpContext<'_>, command: FilesCommand) -> Result<()> {
    match command {
        FilesCommand::List { asset, page } => {
            let query = ListFilesQuery {
                asset_id: asset.map(AssetId::new),
                page: page.page,
                page_size: page.page_size,
                ..Default::default()
            };
            print_json(&inventory.files.list(ctx, &query)?)
        }
        FilesCommand::Add { key, paths } => {
            let id = inventory.assets.get(ctx, &key.query()?)?.id;
            let uploads = paths
                .iter()
                .map(PathBuf::as_path)
                .map(open_upload)
                .collect::<Result<Vec<_>>>()?;
            print_json(&inventory.assets.add_files(ctx, id, uploads)?)
        }
        FilesCommand::Rm { id } => {
            inventory.files.delete(ctx, FileId::new(id))?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        FilesCommand::Cat { id } => {
            let (_, mut reader) = inventory.files.open(ctx, FileId::new(id))?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut reader, &mut stdout)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    load_env_file();
    let cli = Cli::parse();

    let settings = load_settings(&cli)?;
    let _log_guard = logging::init_logging(&settings.log);

    let inventory = Inventory::open(&settings)?;
    let ctx = OpContext::background();

    match cli.command {
        Command::Tags(command) => run_tags(&inventory, &ctx, command),
        Command::Assets(command) => run_assets(&inventory, &ctx, command),
        Command::Files(command) => run_files(&inventory, &ctx, command),
    }
}
