use std::fs;

use anyhow::Result;
use tempfile::tempdir;

use ngs_pipelines::runner::hub;
use ngs_pipelines::toolkit::tracks::track_hub_entry;

#[tokio::test]
async fn concurrent_appends_do_not_corrupt_the_hub() -> Result<()> {
    let tmp = tempdir()?;
    let hub_path = tmp.path().join("html").join("trackHub_hg19.txt");

    let mut tasks = Vec::new();
    for i in 0..16 {
        let hub_path = hub_path.clone();
        tasks.push(tokio::spawn(async move {
            let entry = track_hub_entry(
                &format!("sample_{}", i),
                &format!("http://example.org/data/sample_{}.bigWig", i),
                "255,0,0",
            );
            hub::append_track(&hub_path, &entry).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    let content = fs::read_to_string(&hub_path)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 16);
    for line in &lines {
        // Every entry must be one intact record.
        assert!(line.starts_with("track type=bigWig"));
        assert!(line.contains("bigDataUrl=http://example.org/data/sample_"));
    }
    // The advisory lock is gone once all appenders finished.
    assert!(!tmp.path().join("html").join("trackHub_hg19.txt.lock").exists());
    Ok(())
}

#[tokio::test]
async fn hub_link_page_is_rewritten_idempotently() -> Result<()> {
    let tmp = tempdir()?;
    let page = tmp.path().join("ucsc_tracks_hg19.html");
    let hub_url = "http://example.org/data/prj/trackHub_hg19.txt";

    hub::write_hub_link(&page, hub_url, "hg19")?;
    let first = fs::read_to_string(&page)?;
    hub::write_hub_link(&page, hub_url, "hg19")?;
    let second = fs::read_to_string(&page)?;

    assert_eq!(first, second);
    assert!(first.contains("db=hg19"));
    assert!(first.contains(hub_url));
    Ok(())
}
