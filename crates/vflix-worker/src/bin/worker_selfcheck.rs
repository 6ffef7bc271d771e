use std::path::Path;

use vflix_media::check_ffmpeg;
use vflix_worker::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env()?;

    println!(
        "worker-selfcheck: media_root={} thumbnails={} renditions={}",
        config.media_root.display(),
        config.thumbnail_dir.display(),
        config.variant_labels().collect::<Vec<_>>().join(",")
    );
    ensure_dir(&config.thumbnail_dir).await?;
    let ffmpeg = check_ffmpeg(&config.ffmpeg_path)
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    println!("worker-selfcheck: ffmpeg={}", ffmpeg.display());
    ensure_env_present(&["REDIS_URL"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
