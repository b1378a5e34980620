use anyhow::anyhow;
use tracing::info;

use crate::config::{Pop2PianoConfig, SerializableRecord};
use crate::storage::Storage;
use crate::storage_ext::{download_bar, StorageExt};

const CACHE_VERSION: &str = "v1";

pub const POP2PIANO_PRETRAINED_CONFIG_ARCHIVE_MAP: [(&str, &str); 1] = [(
    "sweetcocoa/pop2piano",
    "https://huggingface.co/sweetcocoa/pop2piano/resolve/main/config.json",
)];

pub fn pretrained_config_url(name: &str) -> anyhow::Result<&'static str> {
    POP2PIANO_PRETRAINED_CONFIG_ARCHIVE_MAP
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, url)| *url)
        .ok_or_else(|| {
            let known = POP2PIANO_PRETRAINED_CONFIG_ARCHIVE_MAP
                .iter()
                .map(|(known, _)| *known)
                .collect::<Vec<_>>()
                .join(", ");
            anyhow!("Unknown pretrained configuration {name}, expected one of: {known}")
        })
}

/// Where a pretrained configuration is cached inside the storage.
pub fn pretrained_config_dir(name: &str) -> String {
    format!("{CACHE_VERSION}/{name}")
}

/// Downloads, once, the configuration of a published checkpoint and parses it.
pub async fn fetch_pretrained_config<S: Storage + 'static>(
    storage: &S,
    name: &str,
    force_download: bool,
) -> anyhow::Result<Pop2PianoConfig> {
    let url = pretrained_config_url(name)?;
    let local_file = format!(
        "{}/{}",
        pretrained_config_dir(name),
        Pop2PianoConfig::FILE_NAME
    );

    let bar = download_bar(&local_file);
    let progress = bar.clone();
    storage
        .fetch_remote_data_file(url, &local_file, force_download, move |el, t| {
            progress.set_length(t as u64);
            progress.set_position(el as u64);
        })
        .await?;
    bar.finish_and_clear();

    let config: Option<Pop2PianoConfig> =
        storage.load_record(&pretrained_config_dir(name)).await?;
    let config =
        config.ok_or_else(|| anyhow!("{local_file} disappeared after being downloaded"))?;
    info!("Loaded pretrained configuration {name}");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use rand::distributions::Alphanumeric;
    use rand::{thread_rng, Rng};

    use super::*;
    use crate::storage::AppFs;

    fn rand_string() -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(7)
            .map(char::from)
            .collect()
    }

    #[test]
    fn resolves_known_names() -> anyhow::Result<()> {
        assert_eq!(
            pretrained_config_url("sweetcocoa/pop2piano")?,
            "https://huggingface.co/sweetcocoa/pop2piano/resolve/main/config.json"
        );
        Ok(())
    }

    #[test]
    fn unknown_names_list_the_known_ones() {
        let err = pretrained_config_url("someone/else").unwrap_err().to_string();
        assert!(err.contains("someone/else"));
        assert!(err.contains("sweetcocoa/pop2piano"));
    }

    #[tokio::test]
    async fn reads_cached_config_without_downloading() -> anyhow::Result<()> {
        let app_fs = AppFs::new(std::env::temp_dir().join(rand_string()));
        app_fs
            .write(
                "v1/sweetcocoa/pop2piano/config.json",
                r#"{"model_type": "pop2piano", "feed_forward_proj": "gated-gelu", "num_hidden_layers": 4}"#,
            )
            .await?;

        let config = fetch_pretrained_config(&app_fs, "sweetcocoa/pop2piano", false).await?;
        assert!(config.is_gated_act());
        assert_eq!(config.dense_act_fn(), "gelu_new");
        assert_eq!(config.num_layers, 4);
        assert_eq!(config.num_decoder_layers, 4);
        Ok(())
    }
}
