use std::time::Duration;

use summariser::extraction::{ContentExtractor, ExtractionError, ExtractorSettings};

fn extractor() -> ContentExtractor {
    ContentExtractor::new(ExtractorSettings {
        timeout: Duration::from_secs(5),
        user_agent: "Summariser-Test/0.1".to_string(),
        max_response_bytes: 64 * 1024,
    })
    .unwrap()
}

#[tokio::test]
async fn test_extracts_article_from_page() {
    let mut server = mockito::Server::new_async().await;
    let page = server
        .mock("GET", "/news/dam")
        .match_header("user-agent", "Summariser-Test/0.1")
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body(
            r#"<!doctype html>
            <html><head><title>Dam</title><style>body{}</style></head>
            <body>
              <header><a href="/">Skip to main content</a></header>
              <aside class="sidebar">Most read: ten cats that look like bread</aside>
              <article>
                <h1>New dam opens</h1>
                <p>The new dam opened on Monday after six years of work.</p>
                <p>It will supply power to two nearby towns.</p>
                <div class="comments"><p>Great news!</p></div>
              </article>
              <footer>Copyright 2024</footer>
            </body></html>"#,
        )
        .create_async()
        .await;

    let text = extractor()
        .extract(&format!("{}/news/dam", server.url()))
        .await
        .unwrap();

    assert!(text.contains("The new dam opened on Monday after six years of work."));
    assert!(text.contains("It will supply power to two nearby towns."));
    assert!(!text.contains("bread"));
    assert!(!text.contains("Great news"));
    assert!(!text.contains("Copyright"));
    page.assert_async().await;
}

#[tokio::test]
async fn test_error_status_is_an_extraction_failure() {
    let mut server = mockito::Server::new_async().await;
    let _missing = server
        .mock("GET", "/gone")
        .with_status(404)
        .with_body("not here")
        .create_async()
        .await;

    let err = extractor()
        .extract(&format!("{}/gone", server.url()))
        .await
        .unwrap_err();

    match err {
        ExtractionError::Status(status) => assert_eq!(status.as_u16(), 404),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_invalid_url_is_rejected_before_fetching() {
    let err = extractor().extract("file:///etc/passwd").await.unwrap_err();
    assert!(matches!(err, ExtractionError::InvalidUrl { .. }));
}

#[tokio::test]
async fn test_oversized_page_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let big = format!("<html><body><p>{}</p></body></html>", "word ".repeat(20_000));
    let _page = server
        .mock("GET", "/huge")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(big)
        .create_async()
        .await;

    let err = extractor()
        .extract(&format!("{}/huge", server.url()))
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::TooLarge { limit: 65536 }));
}

#[tokio::test]
async fn test_oversized_chunked_page_stops_at_the_limit() {
    use std::io::Write;

    let mut server = mockito::Server::new_async().await;
    let _page = server
        .mock("GET", "/stream")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_chunked_body(|w| {
            w.write_all(b"<html><body><p>")?;
            for _ in 0..100 {
                w.write_all(&[b'a'; 1024])?;
            }
            w.write_all(b"</p></body></html>")
        })
        .create_async()
        .await;

    let err = extractor()
        .extract(&format!("{}/stream", server.url()))
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::TooLarge { .. }));
}

#[tokio::test]
async fn test_page_under_the_limit_is_read() {
    let mut server = mockito::Server::new_async().await;
    let _page = server
        .mock("GET", "/small")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body><div class=\"main-content\"><p>Small page text.</p></div></body></html>")
        .create_async()
        .await;

    let text = extractor()
        .extract(&format!("{}/small", server.url()))
        .await
        .unwrap();
    assert_eq!(text, "Small page text.");
}
