use log::info;

use crate::backend::{ChatBackend, invoke_chain};
use crate::error::ExtractError;
use crate::parse;
use crate::prompt::{self, PromptTemplates};
use crate::tags::CategoryConfiguration;
use crate::types::{ExtractionResult, TimeAnchor, TranscriptInput};
use crate::validate::{self, EMPTY_RESULT_NOTICE, ValidatorRules};

/// The extraction pipeline: compose, invoke with fallback, parse, validate.
///
/// Borrows configuration constructed once at startup; every `extract` call
/// owns its own intermediate state, so concurrent calls share nothing
/// mutable.
pub struct Pipeline<'a> {
    backends: &'a [Box<dyn ChatBackend>],
    alternate: Option<usize>,
    categories: &'a CategoryConfiguration,
    templates: &'a PromptTemplates,
    rules: &'a ValidatorRules,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        backends: &'a [Box<dyn ChatBackend>],
        categories: &'a CategoryConfiguration,
        templates: &'a PromptTemplates,
        rules: &'a ValidatorRules,
    ) -> Self {
        Self {
            backends,
            alternate: None,
            categories,
            templates,
            rules,
        }
    }

    /// Mark the backend at `index` as the alternate that
    /// [`TranscriptInput::use_alternate_backend`] rotates to the front.
    pub fn with_alternate(mut self, index: Option<usize>) -> Self {
        self.alternate = index;
        self
    }

    pub fn extract(
        &self,
        input: &TranscriptInput,
        anchor: TimeAnchor,
    ) -> Result<ExtractionResult, ExtractError> {
        let composed = prompt::compose(&input.transcript, &anchor, self.categories, self.templates);
        let order = self.attempt_order(input.use_alternate_backend);

        let (raw, backend) = invoke_chain(&order, &composed.system, &composed.user)
            .map_err(ExtractError::AllBackendsFailed)?;

        let candidates = parse::parse(&raw).map_err(|_| ExtractError::UnparseableResponse {
            backend: backend.name().to_string(),
            model: backend.model().to_string(),
        })?;

        let blocks = validate::validate(
            candidates,
            &input.transcript,
            &anchor,
            self.categories,
            self.rules,
            backend.model(),
        );
        info!("extracted {} block(s) via {}", blocks.len(), backend.name());

        let notice = blocks.is_empty().then(|| EMPTY_RESULT_NOTICE.to_string());
        Ok(ExtractionResult {
            blocks,
            backend: backend.name().to_string(),
            model: backend.model().to_string(),
            raw_response: raw,
            notice,
        })
    }

    fn attempt_order(&self, prefer_alternate: bool) -> Vec<&dyn ChatBackend> {
        let mut order: Vec<&dyn ChatBackend> = self.backends.iter().map(Box::as_ref).collect();
        if prefer_alternate
            && let Some(index) = self.alternate
            && index < order.len()
        {
            let alternate = order.remove(index);
            order.insert(0, alternate);
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::CannedBackend;
    use time::UtcOffset;
    use time::macros::datetime;

    fn anchor() -> TimeAnchor {
        TimeAnchor::new(datetime!(2024-01-01 10:00:00), UtcOffset::UTC)
    }

    fn boxed(backend: CannedBackend) -> Box<dyn ChatBackend> {
        Box::new(backend)
    }

    fn extract(
        backends: &[Box<dyn ChatBackend>],
        transcript: &str,
    ) -> Result<ExtractionResult, ExtractError> {
        let categories = CategoryConfiguration::default();
        let templates = PromptTemplates::builtin();
        let rules = ValidatorRules::default();
        Pipeline::new(backends, &categories, &templates, &rules)
            .extract(&TranscriptInput::new(transcript), anchor())
    }

    #[test]
    fn multi_segment_transcript_yields_every_block() {
        let response = r#"[
            {"activity": "commute to cafe", "start_time": "2024-01-01T08:00:00",
             "end_time": "2024-01-01T09:00:00", "location": "cafe", "tag": "life"},
            {"activity": "study", "start_time": "2024-01-01T09:00:00",
             "end_time": "2024-01-01T09:30:00", "location": "cafe", "tag": "study"}
        ]"#;
        let backends = vec![boxed(CannedBackend::ok("primary", response))];
        let result = extract(&backends, "8am leave home, 9am arrive at cafe, 9 to 9:30 study")
            .unwrap();

        assert_eq!(result.blocks.len(), 2);
        assert_eq!(result.blocks[0].start_time, datetime!(2024-01-01 08:00:00));
        assert_eq!(result.blocks[0].end_time, datetime!(2024-01-01 09:00:00));
        assert_eq!(result.blocks[0].tag, "life");
        assert_eq!(result.blocks[1].start_time, datetime!(2024-01-01 09:00:00));
        assert_eq!(result.blocks[1].end_time, datetime!(2024-01-01 09:30:00));
        assert_eq!(result.blocks[1].tag, "study");
        assert_eq!(result.backend, "primary");
        assert!(result.notice.is_none());
    }

    #[test]
    fn fallback_reaches_second_backend() {
        let backends = vec![
            boxed(CannedBackend::failing("primary", "down")),
            boxed(CannedBackend::ok("secondary", "[]")),
        ];
        let result = extract(&backends, "nothing notable").unwrap();
        assert_eq!(result.backend, "secondary");
        assert_eq!(result.model, "secondary-model");
    }

    #[test]
    fn exhausted_backends_surface_aggregated_failure() {
        let backends = vec![
            boxed(CannedBackend::failing("primary", "down")),
            boxed(CannedBackend::failing("secondary", "also down")),
        ];
        let err = extract(&backends, "anything").unwrap_err();
        match err {
            ExtractError::AllBackendsFailed(attempts) => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].backend, "primary");
                assert_eq!(attempts[1].backend, "secondary");
            }
            other => panic!("expected AllBackendsFailed, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_output_is_distinct_from_empty() {
        let backends = vec![boxed(CannedBackend::ok("primary", "sorry, no JSON here"))];
        let err = extract(&backends, "anything").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::UnparseableResponse { ref backend, .. } if backend == "primary"
        ));

        let backends = vec![boxed(CannedBackend::ok("primary", "[]"))];
        let result = extract(&backends, "anything").unwrap();
        assert!(result.blocks.is_empty());
        assert_eq!(result.notice.as_deref(), Some(EMPTY_RESULT_NOTICE));
    }

    #[test]
    fn all_candidates_rejected_is_success_with_notice() {
        let response = r#"[{"activity": "none", "start_time": "2024-01-01T08:00:00",
                            "end_time": "2024-01-01T09:00:00"}]"#;
        let backends = vec![boxed(CannedBackend::ok("primary", response))];
        let result = extract(&backends, "anything").unwrap();
        assert!(result.blocks.is_empty());
        assert!(result.notice.is_some());
    }

    #[test]
    fn alternate_flag_rotates_configured_backend_to_front() {
        let backends = vec![
            boxed(CannedBackend::ok("cloud", "[]")),
            boxed(CannedBackend::ok("local", "[]")),
        ];
        let categories = CategoryConfiguration::default();
        let templates = PromptTemplates::builtin();
        let rules = ValidatorRules::default();
        let pipeline =
            Pipeline::new(&backends, &categories, &templates, &rules).with_alternate(Some(1));

        let mut input = TranscriptInput::new("anything");
        let result = pipeline.extract(&input, anchor()).unwrap();
        assert_eq!(result.backend, "cloud");

        input.use_alternate_backend = true;
        let result = pipeline.extract(&input, anchor()).unwrap();
        assert_eq!(result.backend, "local");
    }

    #[test]
    fn provenance_names_the_backend_model() {
        let response = r#"{"activity": "eat", "start_time": "2024-01-01T08:00:00",
                           "end_time": "2024-01-01T09:00:00"}"#;
        let backends = vec![boxed(CannedBackend::ok("primary", response))];
        let result = extract(&backends, "breakfast at eight").unwrap();
        assert_eq!(result.blocks[0].description, "[model: primary-model]");
    }
}
