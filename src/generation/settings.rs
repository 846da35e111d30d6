use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CFG_SCALE_RANGE: (f64, f64) = (0.0, 15.0);
pub const STEPS_RANGE: (u32, u32) = (1, 50);
pub const DENOISE_STRENGTH_RANGE: (f64, f64) = (0.0, 1.0);

pub const KNOWN_MODELS: &[&str] = &[
    "stable-diffusion-xl-base-1.0",
    "midjourney-v6",
    "dall-e-3",
    "kandinsky-3",
];

pub const KNOWN_SAMPLERS: &[&str] = &["Euler", "dpm-2m-karras", "euler-a", "dpm-adaptive", "heun"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub model: String,
    pub sampler: String,
    pub cfg_scale: f64,
    pub steps: u32,
    pub denoise_strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: KNOWN_MODELS[0].to_string(),
            sampler: KNOWN_SAMPLERS[0].to_string(),
            cfg_scale: 7.5,
            steps: 20,
            denoise_strength: 0.75,
        }
    }
}

impl GenerationSettings {
    /// Parses the JSON-encoded `settings` form field, reporting every invalid
    /// field rather than stopping at the first one.
    pub fn parse(raw: &str) -> Result<Self, Vec<FieldError>> {
        let value: Value = serde_json::from_str(raw.trim()).map_err(|err| {
            vec![FieldError::new(
                "settings",
                format!("settings must be valid JSON: {err}"),
            )]
        })?;
        let object = value
            .as_object()
            .ok_or_else(|| vec![FieldError::new("settings", "settings must be a JSON object")])?;

        let mut errors = Vec::new();
        let model = required_string(object, "model", &mut errors);
        let sampler = required_string(object, "sampler", &mut errors);
        let cfg_scale = bounded_number(object, "cfgScale", CFG_SCALE_RANGE, &mut errors);
        let steps = bounded_integer(object, "steps", STEPS_RANGE, &mut errors);
        let denoise_strength =
            bounded_number(object, "denoiseStrength", DENOISE_STRENGTH_RANGE, &mut errors);

        match (model, sampler, cfg_scale, steps, denoise_strength) {
            (Some(model), Some(sampler), Some(cfg_scale), Some(steps), Some(denoise_strength))
                if errors.is_empty() =>
            {
                Ok(Self {
                    model,
                    sampler,
                    cfg_scale,
                    steps,
                    denoise_strength,
                })
            }
            _ => Err(errors),
        }
    }
}

fn required_string(
    object: &Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(field, format!("{field} is required")));
            None
        }
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Some(Value::String(_)) => {
            errors.push(FieldError::new(field, format!("{field} must not be empty")));
            None
        }
        Some(_) => {
            errors.push(FieldError::new(field, format!("{field} must be a string")));
            None
        }
    }
}

fn bounded_number(
    object: &Map<String, Value>,
    field: &str,
    (min, max): (f64, f64),
    errors: &mut Vec<FieldError>,
) -> Option<f64> {
    let Some(value) = object.get(field).filter(|value| !value.is_null()) else {
        errors.push(FieldError::new(field, format!("{field} is required")));
        return None;
    };
    let Some(number) = value.as_f64().filter(|number| number.is_finite()) else {
        errors.push(FieldError::new(field, format!("{field} must be a number")));
        return None;
    };
    if number < min || number > max {
        errors.push(FieldError::new(
            field,
            format!("{field} must be between {min} and {max}, got {number}"),
        ));
        return None;
    }
    Some(number)
}

fn bounded_integer(
    object: &Map<String, Value>,
    field: &str,
    (min, max): (u32, u32),
    errors: &mut Vec<FieldError>,
) -> Option<u32> {
    let Some(value) = object.get(field).filter(|value| !value.is_null()) else {
        errors.push(FieldError::new(field, format!("{field} is required")));
        return None;
    };
    let Some(number) = value.as_f64().filter(|number| number.is_finite()) else {
        errors.push(FieldError::new(field, format!("{field} must be a number")));
        return None;
    };
    if number.fract() != 0.0 {
        errors.push(FieldError::new(field, format!("{field} must be an integer")));
        return None;
    }
    if number < f64::from(min) || number > f64::from(max) {
        errors.push(FieldError::new(
            field,
            format!("{field} must be between {min} and {max}, got {number}"),
        ));
        return None;
    }
    Some(number as u32)
}
