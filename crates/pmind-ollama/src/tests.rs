//! Snapshot tests for the Ollama client

#[cfg(test)]
mod snapshot_tests {
    use crate::client::EmbedRequest;
    use crate::{GenerationConfig, OllamaClient, OllamaConfig};
    use insta::assert_json_snapshot;
    use std::time::Duration;

    #[test]
    fn test_config_snapshot() {
        let config = OllamaConfig::new("http://localhost:11434", "nomic-embed-text", "phi4-mini")
            .with_embedding_dimensions(768);

        assert_json_snapshot!(config, {
            ".request_timeout" => "[duration]",
        }, @r###"
        {
          "base_url": "http://localhost:11434",
          "embedding_model": "nomic-embed-text",
          "llm_model": "phi4-mini",
          "embedding_dimensions": 768,
          "request_timeout": "[duration]"
        }
        "###);
    }

    #[test]
    fn test_endpoint_joining() {
        let config = OllamaConfig::new("http://localhost:11434/", "m", "l");
        assert_eq!(config.endpoint("api/embed"), "http://localhost:11434/api/embed");
        assert_eq!(config.endpoint("/api/chat"), "http://localhost:11434/api/chat");
    }

    #[test]
    fn test_embed_request_body() {
        let request = EmbedRequest {
            model: "nomic-embed-text",
            input: "The sky is blue.",
        };

        assert_json_snapshot!(request, @r###"
        {
          "model": "nomic-embed-text",
          "input": "The sky is blue."
        }
        "###);
    }

    #[test]
    fn test_chat_request_body() {
        let client = OllamaClient::new(OllamaConfig::default()).unwrap();
        let generator = client.chat().with_config(GenerationConfig {
            model_id: "phi4-mini".to_string(),
            temperature: Some(0.0),
            max_tokens: Some(256),
            timeout: Duration::from_secs(5),
        });

        assert_json_snapshot!(generator.request("What is the capital of France?"), @r###"
        {
          "model": "phi4-mini",
          "messages": [
            {
              "role": "user",
              "content": "What is the capital of France?"
            }
          ],
          "stream": false,
          "options": {
            "temperature": 0.0,
            "num_predict": 256
          }
        }
        "###);
    }
}
