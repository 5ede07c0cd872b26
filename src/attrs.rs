//! Operator definitions handed over by model-format front-ends.
//!
//! Front-ends which parse external model files produce an [`OperatorDef`]
//! per operator: its type name, the names of its inputs and outputs and a
//! list of `(name, value)` arguments. The same argument name may appear more
//! than once.

use crate::ops::OpError;

/// Value of an operator argument.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AttrValue {
    Int(i64),
    Float(f32),
    Str(String),
}

impl From<i64> for AttrValue {
    fn from(val: i64) -> Self {
        AttrValue::Int(val)
    }
}

impl From<f32> for AttrValue {
    fn from(val: f32) -> Self {
        AttrValue::Float(val)
    }
}

impl From<&str> for AttrValue {
    fn from(val: &str) -> Self {
        AttrValue::Str(val.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(val: String) -> Self {
        AttrValue::Str(val)
    }
}

/// A named operator argument.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Argument {
    pub name: String,
    pub value: AttrValue,
}

/// Definition of one operator in an imported model.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OperatorDef {
    /// Name of the operator. Lowered results are given this name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,

    /// Operator type, eg. "Conv" or "MaxPool".
    pub op_type: String,

    /// Names of the values consumed by the operator.
    #[cfg_attr(feature = "serde", serde(default))]
    pub inputs: Vec<String>,

    /// Names of the values produced by the operator.
    #[cfg_attr(feature = "serde", serde(default))]
    pub outputs: Vec<String>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub args: Vec<Argument>,
}

impl OperatorDef {
    pub fn new(op_type: &str) -> Self {
        OperatorDef {
            op_type: op_type.to_string(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_input(mut self, name: &str) -> Self {
        self.inputs.push(name.to_string());
        self
    }

    pub fn with_output(mut self, name: &str) -> Self {
        self.outputs.push(name.to_string());
        self
    }

    /// Append an argument. Repeated names are kept.
    pub fn with_arg(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.args.push(Argument {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    pub(crate) fn attrs(&self) -> Attrs<'_> {
        Attrs { args: &self.args }
    }
}

/// Typed access to the arguments of an [`OperatorDef`].
pub(crate) struct Attrs<'a> {
    args: &'a [Argument],
}

impl<'a> Attrs<'a> {
    /// Return all values of arguments named `name`, in order.
    fn values(&self, name: &'a str) -> impl Iterator<Item = &'a AttrValue> + 'a {
        let args: &'a [Argument] = self.args;
        args.iter()
            .filter(move |arg| arg.name == name)
            .map(|arg| &arg.value)
    }

    /// Return all integer values of arguments named `name`.
    pub fn ints(&self, name: &'a str) -> Result<Vec<i64>, OpError> {
        self.values(name)
            .map(|val| match val {
                AttrValue::Int(i) => Ok(*i),
                _ => Err(OpError::invalid(format!(
                    "Argument \"{}\" must be an integer",
                    name
                ))),
            })
            .collect()
    }

    /// Return all string values of arguments named `name`.
    pub fn strings(&self, name: &'a str) -> Result<Vec<&'a str>, OpError> {
        self.values(name)
            .map(|val| match val {
                AttrValue::Str(s) => Ok(s.as_str()),
                _ => Err(OpError::invalid(format!(
                    "Argument \"{}\" must be a string",
                    name
                ))),
            })
            .collect()
    }

    /// Return the value of an argument which must appear exactly once.
    ///
    /// Fails with `msg` if the argument is missing or repeated.
    pub fn scalar(&self, name: &'a str, msg: &'static str) -> Result<usize, OpError> {
        match self.ints(name)?.as_slice() {
            [val] => to_usize(name, *val),
            _ => Err(OpError::invalid(msg)),
        }
    }

    /// Return the value of an argument which may appear at most once.
    pub fn optional_scalar(&self, name: &'a str) -> Result<Option<usize>, OpError> {
        match self.ints(name)?.as_slice() {
            [] => Ok(None),
            [val] => to_usize(name, *val).map(Some),
            _ => Err(OpError::invalid(format!(
                "Argument \"{}\" must be scalar value",
                name
            ))),
        }
    }
}

fn to_usize(name: &str, val: i64) -> Result<usize, OpError> {
    usize::try_from(val).map_err(|_| {
        OpError::invalid(format!(
            "Argument \"{}\" must be non-negative, got {}",
            name, val
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::{AttrValue, OperatorDef};
    use crate::ops::OpError;

    #[test]
    fn test_attrs() {
        let def = OperatorDef::new("Conv")
            .with_arg("stride", 2i64)
            .with_arg("kernel", 3i64)
            .with_arg("kernel", 3i64)
            .with_arg("order", "NCHW")
            .with_arg("epsilon", 0.5f32);
        let attrs = def.attrs();

        assert_eq!(attrs.ints("stride"), Ok(vec![2]));
        assert_eq!(attrs.ints("kernel"), Ok(vec![3, 3]));
        assert_eq!(attrs.ints("missing"), Ok(vec![]));
        assert_eq!(attrs.strings("order"), Ok(vec!["NCHW"]));
        assert!(attrs.ints("order").is_err());

        assert_eq!(attrs.scalar("stride", "Stride size must be scalar value"), Ok(2));
        assert_eq!(
            attrs.scalar("kernel", "Kernel size must be scalar value"),
            Err(OpError::invalid("Kernel size must be scalar value"))
        );
        assert_eq!(
            attrs.scalar("missing", "Kernel size must be scalar value"),
            Err(OpError::invalid("Kernel size must be scalar value"))
        );
        assert_eq!(attrs.optional_scalar("pad"), Ok(None));
        assert!(attrs.optional_scalar("kernel").is_err());
    }

    #[test]
    fn test_negative_argument() {
        let def = OperatorDef::new("MaxPool").with_arg("stride", -1i64);
        assert!(matches!(
            def.attrs().scalar("stride", "Stride size must be scalar value"),
            Err(OpError::InvalidValue(_))
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_operator_def() {
        let json = r#"{
            "name": "pool1",
            "op_type": "MaxPool",
            "inputs": ["data"],
            "outputs": ["pool1"],
            "args": [
                {"name": "kernel", "value": {"int": 2}},
                {"name": "order", "value": {"str": "NCHW"}}
            ]
        }"#;
        let def: OperatorDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.name.as_deref(), Some("pool1"));
        assert_eq!(def.args[0].value, AttrValue::Int(2));
        assert_eq!(def.args[1].value, AttrValue::Str("NCHW".into()));

        let round_trip: OperatorDef =
            serde_json::from_str(&serde_json::to_string(&def).unwrap()).unwrap();
        assert_eq!(round_trip, def);

        // Optional fields may be omitted.
        let def: OperatorDef = serde_json::from_str(r#"{"op_type": "FC"}"#).unwrap();
        assert_eq!(def, OperatorDef::new("FC"));
    }
}
