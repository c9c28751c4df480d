use cadence_core::{DeadLetter, QueueEntry};

use crate::cli::DeadLetterCommand;
use crate::commands::common::{format_timestamp, open_local_engine, Context};
use crate::error::CliError;

pub fn format_queue_lines(entries: &[QueueEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{}  {} {}/{}  retries={}  queued {}",
                entry.id,
                entry.action,
                entry.collection,
                entry.entity_id,
                entry.retry_count,
                format_timestamp(entry.created_at)
            )
        })
        .collect()
}

pub fn format_dead_letter_lines(letters: &[DeadLetter]) -> Vec<String> {
    letters
        .iter()
        .map(|letter| {
            format!(
                "{}  {} {}/{}  failed {}: {}",
                letter.entry.id,
                letter.entry.action,
                letter.entry.collection,
                letter.entry.entity_id,
                format_timestamp(letter.failed_at),
                letter.last_error
            )
        })
        .collect()
}

pub async fn run_queue(as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let engine = open_local_engine(ctx).await?;
    let entries = engine.store().list_queue().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }
    for line in format_queue_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_dead_letters(command: DeadLetterCommand, ctx: &Context) -> Result<(), CliError> {
    let engine = open_local_engine(ctx).await?;
    let store = engine.store();

    match command {
        DeadLetterCommand::List { json } => {
            let letters = store.list_dead_letters().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&letters)?);
            } else if letters.is_empty() {
                println!("No dead letters.");
            } else {
                for line in format_dead_letter_lines(&letters) {
                    println!("{line}");
                }
            }
        }
        DeadLetterCommand::Retry { id } => {
            let entry = store
                .requeue_dead_letter(&id)
                .await?
                .ok_or_else(|| CliError::NotFound(format!("dead letter {id}")))?;
            println!("{}", entry.id);
        }
        DeadLetterCommand::Discard { id } => {
            if !store.discard_dead_letter(&id).await? {
                return Err(CliError::NotFound(format!("dead letter {id}")));
            }
            println!("{id}");
        }
    }

    Ok(())
}
