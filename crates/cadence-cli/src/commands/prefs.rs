use crate::cli::PrefsCommand;
use crate::commands::common::{open_local_engine, parse_value, require_text, Context};
use crate::error::CliError;

pub async fn run_prefs(command: PrefsCommand, ctx: &Context) -> Result<(), CliError> {
    let engine = open_local_engine(ctx).await?;
    let store = engine.store();

    match command {
        PrefsCommand::Get { key } => {
            let preference = store
                .get_preference(&key)
                .await?
                .ok_or_else(|| CliError::NotFound(format!("preference {key}")))?;
            println!("{}", serde_json::to_string(&preference.value)?);
        }
        PrefsCommand::Set { key, value } => {
            let key = require_text(&key, "Preference key")?;
            let preference = store.set_preference(&key, parse_value(&value)).await?;
            println!("{} = {}", preference.key, serde_json::to_string(&preference.value)?);
        }
        PrefsCommand::List { json } => {
            let preferences = store.list_preferences().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&preferences)?);
            } else {
                for preference in preferences {
                    println!(
                        "{} = {}",
                        preference.key,
                        serde_json::to_string(&preference.value)?
                    );
                }
            }
        }
        PrefsCommand::Delete { key } => {
            if !store.delete_preference(&key).await? {
                return Err(CliError::NotFound(format!("preference {key}")));
            }
            println!("{key}");
        }
    }

    Ok(())
}
