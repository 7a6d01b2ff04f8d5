//! Input-source checks: sources, telephony, transcriber, and activation.
//!
//! Transcriber and activation each pick a `mode` (`online` | `offline`) that decides
//! which nested speech block must be present.

use std::collections::HashSet;

use kdeps_types::{
    ActivationConfig, InputConfig, OfflineSpeechConfig, OnlineSpeechConfig, Result,
    TelephonyConfig, TranscriberConfig, MODE_OFFLINE, MODE_ONLINE, SOURCE_TELEPHONY,
};

use crate::suggestions::{
    format_options, is_allowed, EnumValue, INPUT_SOURCES, OFFLINE_ENGINES, ONLINE_PROVIDERS,
    SPEECH_MODES, TELEPHONY_TYPES, TRANSCRIBER_OUTPUTS,
};
use crate::workflow::{invalid_workflow, WorkflowValidator};

fn check_enum(label: &str, value: &str, allowed: &[EnumValue]) -> Result<()> {
    if is_allowed(allowed, value) {
        return Ok(());
    }
    Err(invalid_workflow(format!(
        "invalid {label}: {value}. Available options: {}",
        format_options(allowed)
    )))
}

impl WorkflowValidator {
    pub fn validate_input_config(&self, input: &InputConfig) -> Result<()> {
        if input.sources.is_empty() {
            return Err(invalid_workflow("input.sources is required"));
        }
        let mut seen = HashSet::new();
        for source in &input.sources {
            check_enum("input source", source, INPUT_SOURCES)?;
            if !seen.insert(source.as_str()) {
                return Err(invalid_workflow(format!("duplicate input source: {source}")));
            }
        }

        if input.has_source(SOURCE_TELEPHONY) {
            let telephony = input.telephony.as_ref().ok_or_else(|| {
                invalid_workflow("input.telephony is required when sources include telephony")
            })?;
            self.validate_telephony_config(telephony)?;
        }

        let api_only = input.is_api_only();
        if let Some(transcriber) = &input.transcriber {
            if api_only {
                return Err(invalid_workflow(
                    "transcriber is not supported when all sources are api",
                ));
            }
            self.validate_transcriber_config(transcriber)?;
        }
        if let Some(activation) = &input.activation {
            if api_only {
                return Err(invalid_workflow(
                    "activation is not supported when all sources are api",
                ));
            }
            self.validate_activation_config(activation)?;
        }
        Ok(())
    }

    pub fn validate_telephony_config(&self, telephony: &TelephonyConfig) -> Result<()> {
        if telephony.kind.is_empty() {
            return Err(invalid_workflow("telephony.type is required"));
        }
        check_enum("telephony type", &telephony.kind, TELEPHONY_TYPES)
    }

    pub fn validate_transcriber_config(&self, transcriber: &TranscriberConfig) -> Result<()> {
        if transcriber.mode.is_empty() {
            return Err(invalid_workflow("transcriber.mode is required"));
        }
        check_enum("transcriber mode", &transcriber.mode, SPEECH_MODES)?;
        if let Some(output) = transcriber.output.as_deref().filter(|o| !o.is_empty()) {
            check_enum("transcriber output", output, TRANSCRIBER_OUTPUTS)?;
        }
        validate_speech_backend(
            "transcriber",
            &transcriber.mode,
            transcriber.online.as_ref(),
            transcriber.offline.as_ref(),
        )
    }

    pub fn validate_activation_config(&self, activation: &ActivationConfig) -> Result<()> {
        if activation.phrase.is_empty() {
            return Err(invalid_workflow("activation.phrase is required"));
        }
        if activation.mode.is_empty() {
            return Err(invalid_workflow("activation.mode is required"));
        }
        check_enum("activation mode", &activation.mode, SPEECH_MODES)?;
        // Zero means unset.
        let sensitivity = activation.sensitivity;
        if sensitivity != 0.0 && !(0.0..=1.0).contains(&sensitivity) {
            return Err(invalid_workflow(
                "activation.sensitivity must be between 0 and 1",
            ));
        }
        validate_speech_backend(
            "activation",
            &activation.mode,
            activation.online.as_ref(),
            activation.offline.as_ref(),
        )
    }
}

/// Require the speech block matching `mode` and check its provider or engine.
///
/// A block for the other mode is not inspected.
fn validate_speech_backend(
    prefix: &str,
    mode: &str,
    online: Option<&OnlineSpeechConfig>,
    offline: Option<&OfflineSpeechConfig>,
) -> Result<()> {
    match mode {
        MODE_ONLINE => {
            let online = online.ok_or_else(|| {
                invalid_workflow(format!("{prefix}.online is required when mode is online"))
            })?;
            if online.provider.is_empty() {
                return Err(invalid_workflow(format!(
                    "{prefix}.online.provider is required"
                )));
            }
            check_enum(
                &format!("{prefix} online provider"),
                &online.provider,
                ONLINE_PROVIDERS,
            )
        }
        MODE_OFFLINE => {
            let offline = offline.ok_or_else(|| {
                invalid_workflow(format!("{prefix}.offline is required when mode is offline"))
            })?;
            if offline.engine.is_empty() {
                return Err(invalid_workflow(format!(
                    "{prefix}.offline.engine is required"
                )));
            }
            check_enum(
                &format!("{prefix} offline engine"),
                &offline.engine,
                OFFLINE_ENGINES,
            )
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdeps_types::ErrorCode;

    fn validator() -> WorkflowValidator {
        WorkflowValidator::new(None)
    }

    fn sources(list: &[&str]) -> InputConfig {
        InputConfig {
            sources: list.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn online_transcriber() -> TranscriberConfig {
        TranscriberConfig {
            mode: "online".into(),
            online: Some(OnlineSpeechConfig {
                provider: "openai-whisper".into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn offline_activation() -> ActivationConfig {
        ActivationConfig {
            phrase: "hey kdeps".into(),
            mode: "offline".into(),
            offline: Some(OfflineSpeechConfig {
                engine: "whisper".into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn err(input: &InputConfig) -> String {
        validator().validate_input_config(input).unwrap_err().to_string()
    }

    #[test]
    fn sources_required_and_known() {
        assert_eq!(err(&sources(&[])), "input.sources is required");
        assert_eq!(
            err(&sources(&["api", "fax"])),
            "invalid input source: fax. Available options: [api, audio, video, telephony]"
        );
        assert_eq!(err(&sources(&["audio", "audio"])), "duplicate input source: audio");
        validator()
            .validate_input_config(&sources(&["api", "audio", "video"]))
            .unwrap();
    }

    #[test]
    fn telephony_source_requires_block() {
        let mut input = sources(&["telephony"]);
        assert_eq!(
            err(&input),
            "input.telephony is required when sources include telephony"
        );
        input.telephony = Some(TelephonyConfig::default());
        assert_eq!(err(&input), "telephony.type is required");
        input.telephony = Some(TelephonyConfig {
            kind: "satellite".into(),
            ..Default::default()
        });
        assert_eq!(
            err(&input),
            "invalid telephony type: satellite. Available options: [local, online]"
        );
        input.telephony = Some(TelephonyConfig {
            kind: "local".into(),
            ..Default::default()
        });
        validator().validate_input_config(&input).unwrap();
    }

    #[test]
    fn api_only_rejects_speech_processing() {
        let mut input = sources(&["api"]);
        input.transcriber = Some(online_transcriber());
        let e = validator().validate_input_config(&input).unwrap_err();
        assert_eq!(e.code(), ErrorCode::InvalidWorkflow);
        assert_eq!(
            e.to_string(),
            "transcriber is not supported when all sources are api"
        );

        let mut input = sources(&["api"]);
        input.activation = Some(offline_activation());
        assert_eq!(
            err(&input),
            "activation is not supported when all sources are api"
        );
    }

    #[test]
    fn mixed_sources_allow_speech_processing() {
        let mut input = sources(&["api", "audio"]);
        input.transcriber = Some(online_transcriber());
        input.activation = Some(offline_activation());
        validator().validate_input_config(&input).unwrap();
    }

    #[test]
    fn transcriber_mode_gates_backend() {
        let v = validator();
        let mut t = TranscriberConfig::default();
        assert_eq!(
            v.validate_transcriber_config(&t).unwrap_err().to_string(),
            "transcriber.mode is required"
        );
        t.mode = "hybrid".into();
        assert!(v
            .validate_transcriber_config(&t)
            .unwrap_err()
            .to_string()
            .starts_with("invalid transcriber mode: hybrid"));

        t.mode = "offline".into();
        assert_eq!(
            v.validate_transcriber_config(&t).unwrap_err().to_string(),
            "transcriber.offline is required when mode is offline"
        );
        t.offline = Some(OfflineSpeechConfig::default());
        assert_eq!(
            v.validate_transcriber_config(&t).unwrap_err().to_string(),
            "transcriber.offline.engine is required"
        );
        t.offline = Some(OfflineSpeechConfig {
            engine: "dragon".into(),
            ..Default::default()
        });
        assert!(v
            .validate_transcriber_config(&t)
            .unwrap_err()
            .to_string()
            .starts_with("invalid transcriber offline engine: dragon"));

        t.mode = "online".into();
        assert_eq!(
            v.validate_transcriber_config(&t).unwrap_err().to_string(),
            "transcriber.online is required when mode is online"
        );
        t.online = Some(OnlineSpeechConfig {
            provider: "carrier-pigeon".into(),
            ..Default::default()
        });
        assert!(v
            .validate_transcriber_config(&t)
            .unwrap_err()
            .to_string()
            .starts_with("invalid transcriber online provider: carrier-pigeon"));
    }

    #[test]
    fn transcriber_output_enum() {
        let mut t = online_transcriber();
        t.output = Some("hologram".into());
        let e = validator().validate_transcriber_config(&t).unwrap_err().to_string();
        assert_eq!(
            e,
            "invalid transcriber output: hologram. Available options: [text, media]"
        );
        t.output = Some("media".into());
        validator().validate_transcriber_config(&t).unwrap();
    }

    #[test]
    fn activation_rules() {
        let v = validator();
        let mut a = offline_activation();
        v.validate_activation_config(&a).unwrap();

        a.sensitivity = 1.5;
        assert_eq!(
            v.validate_activation_config(&a).unwrap_err().to_string(),
            "activation.sensitivity must be between 0 and 1"
        );
        a.sensitivity = -0.1;
        assert!(v.validate_activation_config(&a).is_err());
        a.sensitivity = 0.0;
        v.validate_activation_config(&a).unwrap();
        a.sensitivity = 1.0;
        v.validate_activation_config(&a).unwrap();

        a.offline = None;
        assert_eq!(
            v.validate_activation_config(&a).unwrap_err().to_string(),
            "activation.offline is required when mode is offline"
        );

        a.phrase.clear();
        assert_eq!(
            v.validate_activation_config(&a).unwrap_err().to_string(),
            "activation.phrase is required"
        );
    }

    #[test]
    fn activation_backend_errors_name_the_activation_block() {
        let v = validator();
        let mut a = offline_activation();
        a.offline = Some(OfflineSpeechConfig {
            engine: "dragon".into(),
            ..Default::default()
        });
        assert_eq!(
            v.validate_activation_config(&a).unwrap_err().to_string(),
            "invalid activation offline engine: dragon. Available options: [whisper, faster-whisper, vosk, whisper-cpp]"
        );

        a.mode = "online".into();
        a.online = Some(OnlineSpeechConfig {
            provider: "carrier-pigeon".into(),
            ..Default::default()
        });
        let e = v.validate_activation_config(&a).unwrap_err().to_string();
        assert!(
            e.starts_with("invalid activation online provider: carrier-pigeon. Available options: [openai-whisper,"),
            "got: {e}"
        );
    }

    #[test]
    fn spare_block_for_other_mode_is_ignored() {
        let v = validator();
        let mut t = online_transcriber();
        t.offline = Some(OfflineSpeechConfig {
            engine: "not-an-engine".into(),
            ..Default::default()
        });
        v.validate_transcriber_config(&t).unwrap();

        let mut a = offline_activation();
        a.online = Some(OnlineSpeechConfig::default());
        v.validate_activation_config(&a).unwrap();
    }
}
