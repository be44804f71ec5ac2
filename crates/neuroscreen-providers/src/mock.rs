//! Mock provider for testing question generation without real API calls.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use neuroscreen_core::traits::{
    GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage,
};

/// Returns canned responses chosen by prompt substring.
pub struct MockProvider {
    /// (prompt substring, response) pairs, checked in order.
    responses: Vec<(String, String)>,
    default_response: String,
    call_count: AtomicU32,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockProvider {
    /// Create a mock with prompt-substring → response mappings.
    pub fn new(responses: Vec<(String, String)>) -> Self {
        Self {
            responses,
            default_response: r#"{"questions": []}"#.to_string(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(vec![])
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let content = self
            .responses
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        // rough estimate: four characters per token
        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                estimated_cost_usd: 0.0,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use neuroscreen_core::generation::{GenerationConfig, LlmQuestionSource};
    use neuroscreen_core::model::{Condition, DifficultyCounts};
    use neuroscreen_core::traits::QuestionSource;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: "mock-model".into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 100,
            temperature: 0.0,
            stop_sequences: vec![],
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let provider = MockProvider::with_fixed_response("{\"questions\": [1]}");
        let response = provider.generate(&request("anything")).await.unwrap();
        assert_eq!(response.content, "{\"questions\": [1]}");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_request().unwrap().prompt, "anything");
    }

    #[tokio::test]
    async fn prompt_matching() {
        let provider = MockProvider::new(vec![
            ("dyslexia".into(), "reading".into()),
            ("autism".into(), "social".into()),
        ]);

        let resp = provider.generate(&request("condition: autism")).await.unwrap();
        assert_eq!(resp.content, "social");
        let resp = provider.generate(&request("condition: dyslexia")).await.unwrap();
        assert_eq!(resp.content, "reading");
        let resp = provider.generate(&request("other")).await.unwrap();
        assert_eq!(resp.content, r#"{"questions": []}"#);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn drives_llm_question_source() {
        let questions: Vec<serde_json::Value> = ["easy", "moderate", "hard"]
            .iter()
            .map(|d| {
                serde_json::json!({
                    "difficulty": d,
                    "question": format!("A {d} question?"),
                    "options": ["one", "two", "three", "four"],
                    "correct_answer": "two",
                    "focus_area": "phonics"
                })
            })
            .collect();
        let body = format!(
            "```json\n{}\n```",
            serde_json::json!({ "questions": questions })
        );
        let provider = Arc::new(MockProvider::with_fixed_response(&body));
        let source = LlmQuestionSource::new(provider.clone(), GenerationConfig::default());

        let counts = DifficultyCounts {
            easy: 1,
            moderate: 1,
            hard: 1,
        };
        let out = source.generate(Condition::Dyslexia, counts).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(source.name(), "llm:mock");
        assert!(provider
            .last_request()
            .unwrap()
            .prompt
            .contains("condition: dyslexia"));
    }
}
