use anyhow::Result;
use grabmodels_detect::DetectorClient;

pub async fn execute(gid: u64, image: &str, model: &str) -> Result<()> {
    let client = DetectorClient::from_env();
    let detections = client.run_inference_on_image(gid, image, model).await;

    if detections.is_empty() {
        eprintln!("No detections for {} from {}", image, client.endpoint());
    }
    println!("{}", serde_json::to_string_pretty(&detections)?);
    Ok(())
}
