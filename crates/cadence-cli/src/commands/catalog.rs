use cadence_core::{CatalogItem, Stored};
use serde::Serialize;

use crate::cli::{CatalogCommand, TrackArgs};
use crate::commands::common::{
    format_stored_lines, open_local_engine, parse_value, require_text, Context,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogListItem {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub updated_at: i64,
    pub sync_status: String,
}

pub fn to_list_item(stored: &Stored<CatalogItem>) -> CatalogListItem {
    CatalogListItem {
        item: stored.entity.clone(),
        updated_at: stored.updated_at,
        sync_status: stored.sync_status.as_str().to_string(),
    }
}

pub fn build_item(args: TrackArgs) -> Result<CatalogItem, CliError> {
    let title = require_text(&args.title, "Title")?;
    let mut item = match args.id {
        Some(id) => CatalogItem::with_id(require_text(&id, "Id")?, title),
        None => CatalogItem::new(title),
    };
    item.artist = cadence_core::util::normalize_text_option(args.artist);
    item.album = cadence_core::util::normalize_text_option(args.album);
    item.genre = cadence_core::util::normalize_text_option(args.genre);
    item.duration_ms = args.duration_ms;
    Ok(item)
}

pub fn summary(item: &CatalogItem) -> String {
    let mut line = format!("{}  {}", item.id, item.title);
    if let Some(artist) = &item.artist {
        line.push_str(&format!(" - {artist}"));
    }
    if let Some(genre) = &item.genre {
        line.push_str(&format!(" [{genre}]"));
    }
    line
}

fn print_items(items: &[Stored<CatalogItem>], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let json_items = items.iter().map(to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_stored_lines(items, summary) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_catalog(command: CatalogCommand, ctx: &Context) -> Result<(), CliError> {
    let engine = open_local_engine(ctx).await?;

    match command {
        CatalogCommand::Add(args) => {
            let stored = engine.save(&build_item(args)?).await?;
            println!("{} ({})", stored.entity.id, stored.sync_status);
        }
        CatalogCommand::List { json } => {
            print_items(&engine.list::<CatalogItem>().await?, json)?;
        }
        CatalogCommand::Get { id, json } => {
            let stored = engine
                .get::<CatalogItem>(&id)
                .await?
                .ok_or_else(|| CliError::NotFound(format!("catalog item {id}")))?;
            print_items(&[stored], json)?;
        }
        CatalogCommand::Delete { id } => {
            if !engine.remove::<CatalogItem>(&id).await? {
                return Err(CliError::NotFound(format!("catalog item {id}")));
            }
            println!("{id}");
        }
        CatalogCommand::Find { index, value, json } => {
            let items = engine
                .find_by_index::<CatalogItem>(&index, &parse_value(&value))
                .await?;
            print_items(&items, json)?;
        }
    }

    Ok(())
}
