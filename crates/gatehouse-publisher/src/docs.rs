//! Client documentation
//!
//! Ready-to-run snippets for a published model. Pure: the same inputs always
//! produce the same documentation. Records keep a placeholder in place of the
//! key; publish and rotate responses render it with the real key.

use gatehouse_common::mesh::API_KEY_HEADER;

use crate::types::{CodeExample, Documentation, ModelType};

/// Stands in for the key in persisted documentation
pub const KEY_PLACEHOLDER: &str = "<YOUR_API_KEY>";

/// Documentation for a model reachable at `url`
pub fn generate(model_type: ModelType, model: &str, url: &str, api_key: &str) -> Documentation {
    let examples = match model_type {
        ModelType::Traditional => traditional_examples(url, api_key),
        ModelType::OpenAi => openai_examples(model, url, api_key),
    };
    let auth_header = match model_type {
        ModelType::Traditional => API_KEY_HEADER.to_string(),
        ModelType::OpenAi => "Authorization: Bearer".to_string(),
    };
    Documentation {
        endpoint: url.to_string(),
        auth_header,
        examples,
    }
}

fn example(title: &str, language: &str, code: String) -> CodeExample {
    CodeExample {
        title: title.to_string(),
        language: language.to_string(),
        code,
    }
}

fn traditional_examples(url: &str, key: &str) -> Vec<CodeExample> {
    vec![
        example(
            "Predict with curl",
            "curl",
            format!(
                r#"curl -X POST "{url}" \
  -H "{API_KEY_HEADER}: {key}" \
  -H "Content-Type: application/json" \
  -d '{{"instances": [[6.8, 2.8, 4.8, 1.4]]}}'"#
            ),
        ),
        example(
            "Predict with Python requests",
            "python",
            format!(
                r#"import requests

response = requests.post(
    "{url}",
    headers={{"{API_KEY_HEADER}": "{key}"}},
    json={{"instances": [[6.8, 2.8, 4.8, 1.4]]}},
)
print(response.json())"#
            ),
        ),
    ]
}

fn openai_examples(model: &str, url: &str, key: &str) -> Vec<CodeExample> {
    vec![
        example(
            "Chat completion with curl",
            "curl",
            format!(
                r#"curl -X POST "{url}/chat/completions" \
  -H "Authorization: Bearer {key}" \
  -H "Content-Type: application/json" \
  -d '{{"model": "{model}", "messages": [{{"role": "user", "content": "Hello!"}}]}}'"#
            ),
        ),
        example(
            "Text completion with curl",
            "curl",
            format!(
                r#"curl -X POST "{url}/completions" \
  -H "Authorization: Bearer {key}" \
  -H "Content-Type: application/json" \
  -d '{{"model": "{model}", "prompt": "Once upon a time", "max_tokens": 64}}'"#
            ),
        ),
        example(
            "Embeddings with curl",
            "curl",
            format!(
                r#"curl -X POST "{url}/embeddings" \
  -H "Authorization: Bearer {key}" \
  -H "Content-Type: application/json" \
  -d '{{"model": "{model}", "input": "The quick brown fox"}}'"#
            ),
        ),
        example(
            "Chat completion with the OpenAI Python client",
            "python",
            format!(
                r#"from openai import OpenAI

client = OpenAI(base_url="{url}", api_key="{key}")
response = client.chat.completions.create(
    model="{model}",
    messages=[{{"role": "user", "content": "Hello!"}}],
)
print(response.choices[0].message.content)"#
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traditional_examples_post_to_the_url_with_key_header() {
        let docs = generate(
            ModelType::Traditional,
            "iris",
            "https://inference.platform.local/a/models/iris",
            "k3y",
        );
        assert_eq!(docs.auth_header, "x-api-key");
        assert_eq!(docs.examples.len(), 2);
        let curl = &docs.examples[0].code;
        assert!(curl.contains(r#"curl -X POST "https://inference.platform.local/a/models/iris""#));
        assert!(curl.contains("x-api-key: k3y"));
        assert!(curl.contains(r#"{"instances""#));
    }

    #[test]
    fn openai_examples_cover_each_endpoint() {
        let docs = generate(
            ModelType::OpenAi,
            "llama",
            "https://inference.platform.local/v1",
            KEY_PLACEHOLDER,
        );
        let all: String = docs.examples.iter().map(|e| e.code.as_str()).collect();
        for path in ["/v1/chat/completions", "/v1/completions", "/v1/embeddings"] {
            assert!(all.contains(path), "missing {path}");
        }
        assert!(all.contains(r#""model": "llama""#));
        assert!(all.contains("Bearer <YOUR_API_KEY>"));
        assert!(docs.examples.iter().any(|e| e.language == "python"));
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generate(ModelType::OpenAi, "m", "https://h/v1", "k");
        let b = generate(ModelType::OpenAi, "m", "https://h/v1", "k");
        assert_eq!(a, b);
    }
}
