use serde_json::{json, Value};

use super::{Scope, Transformer};
use crate::config::EncoderConfig;
use crate::encoder::Encoder;
use crate::error::EncodeError;
use crate::inflector::humanize;
use crate::payload::{classify, ApiException, ErrorObject, ErrorSource, ExceptionKind, Payload};

/// Transforms an exception into `{"errors": [...]}`.
///
/// Unknown exception shapes degrade to a single generic error; the only
/// failure is being handed something that is not an exception at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionTransformer;

impl Transformer for ExceptionTransformer {
    fn name(&self) -> &'static str {
        "exception transformer"
    }

    fn transform(
        &self,
        encoder: &mut Encoder,
        payload: &Payload,
        _scope: &Scope,
    ) -> Result<Value, EncodeError> {
        let Payload::Exception(exception) = payload else {
            return Err(EncodeError::UnsupportedPayload {
                transformer: self.name(),
                actual: format!("{:?}", classify(payload)),
            });
        };

        let errors = error_objects(encoder.config(), exception);
        let errors: Vec<Value> = errors
            .into_iter()
            .map(|error| serde_json::to_value(error).unwrap_or(Value::Null))
            .collect();
        Ok(json!({ "errors": errors }))
    }
}

/// Normalize an exception into error objects.
pub(crate) fn error_objects(config: &EncoderConfig, exception: &ApiException) -> Vec<ErrorObject> {
    let status = status_for(config, exception).to_string();
    let code = exception.code.to_string();
    let title = humanize(short_class(&exception.class));

    match &exception.kind {
        ExceptionKind::Errors(errors) => errors.clone(),
        ExceptionKind::Validation {
            messages,
            pointer_prefix,
        } => {
            let prefix = pointer_prefix
                .as_deref()
                .unwrap_or(&config.validation_pointer_prefix);
            let mut errors = Vec::new();
            for (field, field_messages) in messages {
                let source = Some(ErrorSource {
                    pointer: format!("{}{}", prefix, field.replace('.', "/")),
                });
                let error = |detail: String| ErrorObject {
                    status: Some(status.clone()),
                    code: Some(code.clone()),
                    title: Some(title.clone()),
                    detail: Some(detail),
                    source: source.clone(),
                };
                if config.group_validation_errors {
                    errors.push(error(field_messages.join("\n")));
                } else {
                    errors.extend(field_messages.iter().cloned().map(error));
                }
            }
            errors
        }
        ExceptionKind::Generic | ExceptionKind::Response { .. } => vec![ErrorObject {
            status: Some(status),
            code: Some(code),
            title: Some(title),
            detail: Some(exception.message.clone()),
            source: None,
        }],
    }
}

/// Response status, then configured class status, then the exception's own, then 500.
fn status_for(config: &EncoderConfig, exception: &ApiException) -> u16 {
    if let ExceptionKind::Response { status } = exception.kind {
        return status;
    }
    config
        .exception_status
        .get(&exception.class)
        .or_else(|| config.exception_status.get(short_class(&exception.class)))
        .copied()
        .or(exception.status)
        .unwrap_or(500)
}

fn short_class(class: &str) -> &str {
    class.rsplit("::").next().unwrap_or(class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn validation() -> ApiException {
        let mut messages = IndexMap::new();
        messages.insert(
            "test".to_string(),
            vec!["first message".to_string(), "second message".to_string()],
        );
        messages.insert("author.name".to_string(), vec!["required".to_string()]);
        ApiException::validation(messages)
    }

    #[test]
    fn generic_exception_defaults_to_500() {
        let exception = ApiException::new("app::errors::ModelNotFoundException", "No post 7");
        let errors = error_objects(&EncoderConfig::default(), &exception);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].status.as_deref(), Some("500"));
        assert_eq!(errors[0].code.as_deref(), Some("0"));
        assert_eq!(errors[0].title.as_deref(), Some("Model not found exception"));
        assert_eq!(errors[0].detail.as_deref(), Some("No post 7"));
    }

    #[test]
    fn status_precedence() {
        let mut config = EncoderConfig::default();
        config
            .exception_status
            .insert("ModelNotFoundException".into(), 404);

        let mapped = ApiException::new("app::ModelNotFoundException", "").with_status(410);
        assert_eq!(status_for(&config, &mapped), 404);

        let own = ApiException::http(403, "nope");
        assert_eq!(status_for(&config, &own), 403);

        let response = ApiException::response(302, "moved").with_status(500);
        assert_eq!(status_for(&config, &response), 302);
    }

    #[test]
    fn validation_one_error_per_message() {
        let errors = error_objects(&EncoderConfig::default(), &validation());
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].source, errors[1].source);
        assert_eq!(
            errors[0].source.as_ref().map(|s| s.pointer.as_str()),
            Some("/data/attributes/test")
        );
        assert_eq!(errors[0].detail.as_deref(), Some("first message"));
        assert_eq!(errors[1].detail.as_deref(), Some("second message"));
        assert_eq!(
            errors[2].source.as_ref().map(|s| s.pointer.as_str()),
            Some("/data/attributes/author/name")
        );
        assert_eq!(errors[0].status.as_deref(), Some("422"));
    }

    #[test]
    fn validation_grouped_by_field() {
        let config = EncoderConfig {
            group_validation_errors: true,
            ..Default::default()
        };
        let errors = error_objects(&config, &validation());
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[0].detail.as_deref(),
            Some("first message\nsecond message")
        );
    }

    #[test]
    fn prebuilt_errors_pass_through() {
        let prebuilt = vec![ErrorObject {
            status: Some("409".into()),
            title: Some("Conflict".into()),
            ..Default::default()
        }];
        let errors = error_objects(&EncoderConfig::default(), &ApiException::errors(prebuilt.clone()));
        assert_eq!(errors, prebuilt);
    }
}
