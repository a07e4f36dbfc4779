use crate::{App, Config, context::RequestContext, rating::RatingRelatedType};
use clap::Subcommand;
use std::time::Duration;

#[derive(Subcommand)]
pub enum RatingCommand {
    /// Print rating distributions as JSON
    Show {
        #[arg(help = "Related type: course, teacher or training_plan")]
        related_type: RatingRelatedType,

        #[arg(required = true, help = "Related entity ids")]
        ids: Vec<i64>,

        #[arg(long, help = "Query timeout in seconds", default_value = "10")]
        timeout: u64,
    },
}

pub async fn handle_rating_command(
    command: RatingCommand,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::new(config.clone()).await?;

    match command {
        RatingCommand::Show {
            related_type,
            ids,
            timeout,
        } => {
            let ctx = RequestContext::background().with_timeout(Duration::from_secs(timeout));

            let output = if let [id] = ids.as_slice() {
                let info = app.ratings.get_rating_info(&ctx, related_type, *id).await?;
                serde_json::to_string_pretty(&info)?
            } else {
                let infos = app
                    .ratings
                    .get_rating_info_by_ids(&ctx, related_type, &ids)
                    .await?;
                let ordered: std::collections::BTreeMap<i64, _> = infos.into_iter().collect();
                serde_json::to_string_pretty(&ordered)?
            };

            println!("{output}");
        }
    }

    Ok(())
}
