use porchlight_browser::{BrowserEngine, PageDriver};

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_browser_engine_launch() {
    let config = porchlight_core::BrowserConfig::default();
    let engine = BrowserEngine::launch(&config).await;
    assert!(engine.is_ok(), "Failed to launch browser engine");
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_navigation_and_source() {
    let config = porchlight_core::BrowserConfig::default();
    let engine = BrowserEngine::launch(&config).await.unwrap();

    engine.navigate("https://example.com").await.unwrap();
    let url = engine.current_url().await.unwrap();
    assert!(url.contains("example.com"));

    let source = engine.page_source().await.unwrap();
    assert!(source.contains("<html"));

    engine.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_script_evaluation() {
    let config = porchlight_core::BrowserConfig::default();
    let engine = BrowserEngine::launch(&config).await.unwrap();

    engine.navigate("https://example.com").await.unwrap();
    let height = engine.execute("document.body.scrollHeight").await.unwrap();
    assert!(height.as_i64().unwrap_or(0) > 0);

    engine.close().await.unwrap();
}
