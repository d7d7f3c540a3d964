use super::*;

/// Native callable stored inside a [`Value::Function`].
pub struct NativeFunction {
    name: String,
    call: Box<dyn Fn(&[Value]) -> Result<Value>>,
}

impl NativeFunction {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectValue {
    entries: Vec<(String, Value)>,
    index_by_key: HashMap<String, usize>,
}

impl ObjectValue {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        let mut value = Self::default();
        for (key, entry_value) in entries {
            value.set_entry(key, entry_value);
        }
        value
    }

    pub fn set_entry(&mut self, key: String, value: Value) {
        if let Some(index) = self.index_by_key.get(&key).copied() {
            if let Some((_, existing)) = self.entries.get_mut(index) {
                *existing = value;
                return;
            }
        }
        let index = self.entries.len();
        self.entries.push((key.clone(), value));
        self.index_by_key.insert(key, index);
    }

    pub fn get_entry(&self, key: &str) -> Option<Value> {
        self.index_by_key
            .get(key)
            .and_then(|index| self.entries.get(*index))
            .map(|(_, value)| value.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// Dynamically shaped payload carried by promises.
///
/// Producers may fulfill with anything, so thenable detection is a runtime
/// probe over this type rather than a compile-time bound. An
/// [`Value::Object`] whose `then` entry is callable is treated as a thenable.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(i64),
    Float(f64),
    String(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<ObjectValue>>),
    Function(Rc<NativeFunction>),
    Promise(Promise),
    PromiseCapability(ResolvingFunction),
}

impl Value {
    pub fn function<F>(name: impl Into<String>, call: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        Self::Function(Rc::new(NativeFunction {
            name: name.into(),
            call: Box::new(call),
        }))
    }

    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        Self::Object(Rc::new(RefCell::new(ObjectValue::new(entries))))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(values)))
    }

    /// Builds an object whose only entry is a callable `then`, the minimal
    /// shape the resolution procedure adopts.
    pub fn thenable<F>(then: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        Self::object([("then", Self::function("then", then))])
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::PromiseCapability(_))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        match self {
            Self::Function(function) => (function.call)(args),
            Self::PromiseCapability(capability) => {
                capability.call(args.first().cloned().unwrap_or(Value::Undefined));
                Ok(Value::Undefined)
            }
            other => Err(Error::NotCallable(other.type_name().into())),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Self::Object(entries) => entries.borrow().get_entry(key),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Self::Promise(promise) => Some(promise),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) | Self::Float(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Function(_) | Self::PromiseCapability(_) => "function",
            Self::Promise(_) => "promise",
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".into(),
            Self::Null => "null".into(),
            Self::Bool(v) => {
                if *v {
                    "true".into()
                } else {
                    "false".into()
                }
            }
            Self::Number(v) => v.to_string(),
            Self::Float(v) => format_float(*v),
            Self::String(v) => v.clone(),
            Self::Array(values) => {
                let values = values.borrow();
                let mut out = String::new();
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    if matches!(value, Value::Null | Value::Undefined) {
                        continue;
                    }
                    out.push_str(&value.as_string());
                }
                out
            }
            Self::Object(_) => "[object Object]".into(),
            Self::Function(_) | Self::PromiseCapability(_) => "[object Function]".into(),
            Self::Promise(_) => "[object Promise]".into(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => left == right,
            (Self::Float(left), Self::Float(right)) => left == right,
            (Self::String(left), Self::String(right)) => left == right,
            (Self::Array(left), Self::Array(right)) => {
                Rc::ptr_eq(left, right) || *left.borrow() == *right.borrow()
            }
            (Self::Object(left), Self::Object(right)) => {
                Rc::ptr_eq(left, right) || *left.borrow() == *right.borrow()
            }
            (Self::Function(left), Self::Function(right)) => Rc::ptr_eq(left, right),
            (Self::Promise(left), Self::Promise(right)) => left == right,
            (Self::PromiseCapability(left), Self::PromiseCapability(right)) => left == right,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Number(v) => f.debug_tuple("Number").field(v).finish(),
            Self::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Self::String(v) => f.debug_tuple("String").field(v).finish(),
            Self::Array(values) => f.debug_tuple("Array").field(&*values.borrow()).finish(),
            Self::Object(entries) => f
                .debug_map()
                .entries(
                    entries
                        .borrow()
                        .entries
                        .iter()
                        .map(|(key, value)| (key.clone(), value.clone())),
                )
                .finish(),
            Self::Function(function) => write!(f, "Function({})", function.name),
            Self::Promise(promise) => write!(f, "Promise(#{})", promise.id()),
            Self::PromiseCapability(capability) => fmt::Debug::fmt(capability, f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Undefined
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Number(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Promise> for Value {
    fn from(value: Promise) -> Self {
        Self::Promise(value)
    }
}

impl From<&Promise> for Value {
    fn from(value: &Promise) -> Self {
        Self::Promise(value.clone())
    }
}

impl From<ResolvingFunction> for Value {
    fn from(value: ResolvingFunction) -> Self {
        Self::PromiseCapability(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::array(values)
    }
}

pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value == f64::INFINITY {
        return "Infinity".to_string();
    }
    if value == f64::NEG_INFINITY {
        return "-Infinity".to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let raw = format!("{value}");
    let Some(exp_idx) = raw.find('e').or_else(|| raw.find('E')) else {
        return raw;
    };
    let mantissa = &raw[..exp_idx];
    let exponent = raw[exp_idx + 1..].parse::<i32>().unwrap_or(0);
    format!("{mantissa}e{:+}", exponent)
}
