use cadence_core::Playlist;
use serde::Serialize;

use crate::cli::PlaylistCommand;
use crate::commands::common::{format_stored_lines, open_local_engine, require_text, Context};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistListItem {
    #[serde(flatten)]
    playlist: Playlist,
    updated_at: i64,
    sync_status: String,
}

pub fn build_playlist(
    name: &str,
    id: Option<String>,
    description: Option<String>,
    tracks: Vec<String>,
) -> Result<Playlist, CliError> {
    let mut playlist = Playlist::new(require_text(name, "Playlist name")?);
    if let Some(id) = id {
        playlist.id = require_text(&id, "Id")?;
    }
    playlist.description = cadence_core::util::normalize_text_option(description);
    for track in tracks {
        playlist.add_track(require_text(&track, "Track id")?);
    }
    Ok(playlist)
}

fn summary(playlist: &Playlist) -> String {
    format!(
        "{}  {} ({} tracks)",
        playlist.id,
        playlist.name,
        playlist.track_ids.len()
    )
}

pub async fn run_playlist(command: PlaylistCommand, ctx: &Context) -> Result<(), CliError> {
    let engine = open_local_engine(ctx).await?;

    match command {
        PlaylistCommand::Add {
            name,
            id,
            description,
            tracks,
        } => {
            let playlist = build_playlist(&name, id, description, tracks)?;
            let stored = engine.save(&playlist).await?;
            println!("{} ({})", stored.entity.id, stored.sync_status);
        }
        PlaylistCommand::List { json } => {
            let playlists = engine.list::<Playlist>().await?;
            if json {
                let items = playlists
                    .iter()
                    .map(|stored| PlaylistListItem {
                        playlist: stored.entity.clone(),
                        updated_at: stored.updated_at,
                        sync_status: stored.sync_status.as_str().to_string(),
                    })
                    .collect::<Vec<_>>();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for line in format_stored_lines(&playlists, summary) {
                    println!("{line}");
                }
            }
        }
        PlaylistCommand::Delete { id } => {
            if !engine.remove::<Playlist>(&id).await? {
                return Err(CliError::NotFound(format!("playlist {id}")));
            }
            println!("{id}");
        }
    }

    Ok(())
}
