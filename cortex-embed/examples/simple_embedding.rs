//! Simple example sending a few texts to an embeddings service.
//!
//! Set `EMBEDDING_SERVICE_URL` to point at a running service, for example
//! `http://localhost:7002`.

use cortex_embed::{EmbedConfig, EmbeddingClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let base = std::env::var("EMBEDDING_SERVICE_URL")
        .unwrap_or_else(|_| "http://localhost:7002".to_string());
    let config = EmbedConfig::http(format!("{}/api/embeddings", base.trim_end_matches('/')))
        .with_batch_size(2);

    println!("Endpoint:   {}", config.endpoint);
    println!("Batch size: {}", config.batch_size);

    let client = EmbeddingClient::from_config(&config)?;

    let texts = vec![
        "Rust is a systems programming language.".to_string(),
        "Vector search ranks chunks by cosine similarity.".to_string(),
        "Machine learning models process natural language.".to_string(),
    ];

    let result = client.embed(&texts).await?;

    println!("Generated {} embeddings", result.len());
    println!("Embedding dimension: {}", result.dimension);

    for (i, (text, embedding)) in texts.iter().zip(result.embeddings.iter()).enumerate() {
        println!("Text {}: \"{}\"", i + 1, text);
        println!(
            "  First 3 values: {:?}",
            &embedding[..3.min(embedding.len())]
        );
    }

    Ok(())
}
