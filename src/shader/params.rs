use crate::error::ParameterError;
use std::collections::BTreeMap;

pub type Choices = &'static [(i32, &'static str)];

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float {
        value: f32,
        min: f32,
        max: f32,
        default: f32,
    },
    Int {
        value: i32,
        min: i32,
        max: i32,
        default: i32,
        /// Dropdown labels, empty for a plain slider.
        choices: Choices,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    pub hint: &'static str,
    pub value: ParamValue,
}

impl Parameter {
    pub fn float(name: &'static str, hint: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            hint,
            value: ParamValue::Float {
                value: default,
                min,
                max,
                default,
            },
        }
    }

    pub fn int(name: &'static str, hint: &'static str, default: i32, min: i32, max: i32) -> Self {
        Self::choice(name, hint, default, min, max, &[])
    }

    pub fn choice(
        name: &'static str,
        hint: &'static str,
        default: i32,
        min: i32,
        max: i32,
        choices: Choices,
    ) -> Self {
        Self {
            name,
            hint,
            value: ParamValue::Int {
                value: default,
                min,
                max,
                default,
                choices,
            },
        }
    }

    pub fn as_f32(&self) -> f32 {
        match self.value {
            ParamValue::Float { value, .. } => value,
            ParamValue::Int { value, .. } => value as f32,
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self.value {
            ParamValue::Float { value, .. } => value.round() as i32,
            ParamValue::Int { value, .. } => value,
        }
    }

    /// Sets the value, clamped to the parameter's range.
    pub fn set_f32(&mut self, new_value: f32) {
        match &mut self.value {
            ParamValue::Float { value, min, max, .. } => *value = new_value.clamp(*min, *max),
            ParamValue::Int { value, min, max, .. } => {
                *value = (new_value.round() as i32).clamp(*min, *max)
            }
        }
    }

    pub fn set_i32(&mut self, new_value: i32) {
        match &mut self.value {
            ParamValue::Float { value, min, max, .. } => *value = (new_value as f32).clamp(*min, *max),
            ParamValue::Int { value, min, max, .. } => *value = new_value.clamp(*min, *max),
        }
    }

    pub fn reset(&mut self) {
        match &mut self.value {
            ParamValue::Float { value, default, .. } => *value = *default,
            ParamValue::Int { value, default, .. } => *value = *default,
        }
    }

    pub fn is_default(&self) -> bool {
        match self.value {
            ParamValue::Float { value, default, .. } => value == default,
            ParamValue::Int { value, default, .. } => value == default,
        }
    }

    pub fn value_string(&self) -> String {
        match self.value {
            ParamValue::Float { value, .. } => value.to_string(),
            ParamValue::Int { value, .. } => value.to_string(),
        }
    }

    /// Label for the current value: the dropdown text when there is one.
    pub fn display_value(&self) -> String {
        match self.value {
            ParamValue::Float { value, .. } => format!("{:.3}", value),
            ParamValue::Int { value, choices, .. } => choices
                .iter()
                .find(|(v, _)| *v == value)
                .map(|(_, label)| label.to_string())
                .unwrap_or_else(|| value.to_string()),
        }
    }

    pub fn set_from_str(&mut self, text: &str) -> Result<(), ParameterError> {
        let name = self.name;
        let invalid = || ParameterError::Invalid {
            name: name.to_string(),
            value: text.to_string(),
        };
        match self.value {
            ParamValue::Float { .. } => {
                let parsed: f32 = text.trim().parse().map_err(|_| invalid())?;
                if !parsed.is_finite() {
                    return Err(invalid());
                }
                self.set_f32(parsed);
            }
            ParamValue::Int { .. } => {
                let parsed: i32 = text.trim().parse().map_err(|_| invalid())?;
                self.set_i32(parsed);
            }
        }
        Ok(())
    }
}

/// A profile's parameters in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new(params: Vec<Parameter>) -> Self {
        Self { params }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Parameter> {
        self.params.get_mut(index)
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    pub(crate) fn f32_at(&self, index: usize) -> f32 {
        self.params.get(index).map(Parameter::as_f32).unwrap_or_default()
    }

    pub(crate) fn i32_at(&self, index: usize) -> i32 {
        self.params.get(index).map(Parameter::as_i32).unwrap_or_default()
    }

    pub fn reset_defaults(&mut self) {
        self.params.iter_mut().for_each(Parameter::reset);
    }

    /// Values that differ from their defaults, for saving.
    pub fn overrides(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .filter(|p| !p.is_default())
            .map(|p| (p.name.to_string(), p.value_string()))
            .collect()
    }

    /// Applies saved values. Keeps going past bad entries and returns them.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, String>) -> Vec<ParameterError> {
        let mut errors = Vec::new();
        for (name, value) in overrides {
            match self.by_name_mut(name) {
                Some(param) => {
                    if let Err(e) = param.set_from_str(value) {
                        errors.push(e);
                    }
                }
                None => errors.push(ParameterError::Unknown(name.clone())),
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECTIONS: Choices = &[(0, "None"), (1, "Down")];

    fn set() -> ParameterSet {
        ParameterSet::new(vec![
            Parameter::float("Gamma", "", 2.2, 0.5, 5.0),
            Parameter::int("Divisor", "", 1, 1, 100),
            Parameter::choice("Direction", "", 1, 0, 1, DIRECTIONS),
        ])
    }

    #[test]
    fn setters_clamp_to_range() {
        let mut params = set();
        params.get_mut(0).unwrap().set_f32(9.0);
        params.get_mut(1).unwrap().set_i32(-4);
        assert_eq!(params.f32_at(0), 5.0);
        assert_eq!(params.i32_at(1), 1);
    }

    #[test]
    fn overrides_hold_only_changed_values() {
        let mut params = set();
        assert!(params.overrides().is_empty());
        params.get_mut(1).unwrap().set_i32(3);
        let overrides = params.overrides();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides.get("Divisor").map(String::as_str), Some("3"));

        let mut fresh = set();
        assert!(fresh.apply_overrides(&overrides).is_empty());
        assert_eq!(fresh, params);

        params.reset_defaults();
        assert!(params.overrides().is_empty());
    }

    #[test]
    fn bad_overrides_are_reported_and_skipped() {
        let mut params = set();
        let mut overrides = BTreeMap::new();
        overrides.insert("Gamma".to_string(), "bright".to_string());
        overrides.insert("Missing".to_string(), "1".to_string());
        overrides.insert("Divisor".to_string(), "7".to_string());
        let errors = params.apply_overrides(&overrides);
        assert_eq!(errors.len(), 2);
        assert_eq!(params.i32_at(1), 7);
        assert_eq!(params.f32_at(0), 2.2);
    }

    #[test]
    fn choice_displays_its_label() {
        let params = set();
        assert_eq!(params.get(2).unwrap().display_value(), "Down");
        assert_eq!(params.get(1).unwrap().display_value(), "1");
    }
}
