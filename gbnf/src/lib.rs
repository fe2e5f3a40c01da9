use itertools::Itertools;

pub mod prelude {
    pub use crate::AsGbnf;
    pub use crate::AsGrammar;
    pub use crate::GbnfComplex;
    pub use crate::GbnfField;
    pub use crate::GbnfFieldType;
    pub use crate::GbnfLimited;
    pub use crate::GbnfPrimitive;
    pub use crate::GbnfRule;
    pub use crate::GbnfToken;
}

// Converts GBNF defintions (through the types below) into the grammar
// rules.
pub trait AsGrammar {
    fn rules(&self) -> Vec<GbnfRule>;
    fn token(&self) -> String;
}

/// Trait for regular types to implement to convert themselves to a
/// GBNF value.
pub trait AsGbnf {
    fn to_gbnf() -> GbnfFieldType;
}

macro_rules! define_field_type {
    ($type:ty, $gbnf_type:expr) => {
        impl AsGbnf for $type {
            fn to_gbnf() -> GbnfFieldType {
                $gbnf_type
            }
        }
    };
}

define_field_type!(i32, GbnfFieldType::Primitive(GbnfPrimitive::Number));
define_field_type!(u32, GbnfFieldType::Primitive(GbnfPrimitive::Number));
define_field_type!(i64, GbnfFieldType::Primitive(GbnfPrimitive::Number));
define_field_type!(u64, GbnfFieldType::Primitive(GbnfPrimitive::Number));
define_field_type!(f32, GbnfFieldType::Primitive(GbnfPrimitive::Number));
define_field_type!(f64, GbnfFieldType::Primitive(GbnfPrimitive::Number));
define_field_type!(usize, GbnfFieldType::Primitive(GbnfPrimitive::Number));
define_field_type!(bool, GbnfFieldType::Primitive(GbnfPrimitive::Boolean));
define_field_type!(String, GbnfFieldType::Primitive(GbnfPrimitive::String));

impl<T> AsGbnf for Vec<T>
where
    T: AsGbnf,
{
    fn to_gbnf() -> GbnfFieldType {
        use GbnfFieldType::*;
        match <T as AsGbnf>::to_gbnf() {
            Primitive(primitive_type) | OptionalPrimitive(primitive_type) => {
                PrimitiveList(primitive_type)
            }
            Complex(complex_type) | OptionalComplex(complex_type) => ComplexList(complex_type),
            Limited(limited) => LimitedList(limited),
            _ => panic!("nested lists not supported"),
        }
    }
}

impl<T> AsGbnf for Option<T>
where
    T: AsGbnf,
{
    fn to_gbnf() -> GbnfFieldType {
        use GbnfFieldType::*;
        match <T as AsGbnf>::to_gbnf() {
            Primitive(primitive_type) => OptionalPrimitive(primitive_type),
            Complex(complex_type) => OptionalComplex(complex_type),
            Limited(limited) => OptionalLimited(limited),
            OptionalPrimitive(_) | OptionalComplex(_) | OptionalLimited(_) => {
                panic!("nested options are not allowed")
            }
            _ => panic!("optional type cannot be a list"),
        }
    }
}

// Actual GBNF rule itself. Holds rule text for dedup.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct GbnfRule {
    name: String,
    text: String,
}

impl GbnfRule {
    pub fn new(token: String, rule_text: String) -> GbnfRule {
        GbnfRule {
            name: token,
            text: rule_text,
        }
    }

    pub fn single(token: String, rule_text: String) -> Vec<GbnfRule> {
        vec![GbnfRule::new(token, rule_text)]
    }
}

/// Tokens in the GBNF rule.
pub enum GbnfToken {
    Space,
    Null,
}

impl GbnfToken {
    pub(self) const SPACE: &'static str = r#"[ \t\n]*"#;
    pub(self) const NULL: &'static str = r#""null""#;
}

impl AsGrammar for GbnfToken {
    fn rules(&self) -> Vec<GbnfRule> {
        match self {
            Self::Space => GbnfRule::single(self.token(), Self::SPACE.to_string()),
            Self::Null => GbnfRule::single(self.token(), Self::NULL.to_string()),
        }
    }

    fn token(&self) -> String {
        match self {
            Self::Space => "ws".to_string(),
            Self::Null => "null".to_string(),
        }
    }
}

/// Represents a primitive value in the GBNF, the simplest possible
/// value a type can hold.
#[derive(Debug, Clone, Copy)]
pub enum GbnfPrimitive {
    String,
    Boolean,
    Number,
}

impl GbnfPrimitive {
    pub(self) const STRING: &'static str = r#""\""   ([^"]*)   "\"""#;
    pub(self) const BOOLEAN: &'static str = r#""true" | "false""#;
    pub(self) const NUMBER: &'static str = r#"[0-9]+   "."?   [0-9]*"#;
}

impl AsGrammar for GbnfPrimitive {
    /// Output the raw GBNF rule of this primitive.
    fn rules(&self) -> Vec<GbnfRule> {
        let rule_text = match self {
            Self::Boolean => Self::BOOLEAN,
            Self::Number => Self::NUMBER,
            Self::String => Self::STRING,
        };

        GbnfRule::single(self.token(), rule_text.to_string())
    }

    /// Output the token name of the GBNF rule (to refer to in other
    /// rules).
    fn token(&self) -> String {
        String::from(match self {
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
        })
    }
}

/// A string field that may only take one of a closed set of values.
/// Rendered as an alternation of quoted literals.
#[derive(Debug, Clone)]
pub struct GbnfLimited {
    pub name: String,
    pub values: Vec<String>,
}

impl GbnfLimited {
    pub fn new(name: &str, values: &[&str]) -> GbnfLimited {
        GbnfLimited {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl AsGrammar for GbnfLimited {
    fn rules(&self) -> Vec<GbnfRule> {
        let alternatives = self
            .values
            .iter()
            .map(|value| format!(r#""\"{}\"""#, value))
            .join(" | ");

        GbnfRule::single(self.token(), alternatives)
    }

    fn token(&self) -> String {
        self.name.clone()
    }
}

/// Categorize all types of fields that the generated grammar can
/// handle.
#[derive(Debug)]
pub enum GbnfFieldType {
    /// A single property on the type, e.g. myField: i32
    Primitive(GbnfPrimitive),

    /// Can be a value or null.
    OptionalPrimitive(GbnfPrimitive),

    /// A list/vec of primitive types.
    PrimitiveList(GbnfPrimitive),

    /// A complex type, with its own properties.
    Complex(GbnfComplex),

    /// Can be a value or null.
    OptionalComplex(GbnfComplex),

    /// A list/vec of complex types.
    ComplexList(GbnfComplex),

    /// A string property restricted to a fixed set of values.
    Limited(GbnfLimited),

    /// Limited value or null.
    OptionalLimited(GbnfLimited),

    /// A list of limited values.
    LimitedList(GbnfLimited),
}

impl GbnfFieldType {
    pub fn as_complex(self) -> GbnfComplex {
        match self {
            GbnfFieldType::Complex(complex) => complex,
            _ => panic!("Not a GBNF complex type"),
        }
    }
}

/// Connect a property name and a field type to generate a GBNF rule.
#[derive(Debug)]
pub struct GbnfField {
    pub field_name: String,
    pub field_type: GbnfFieldType,
}

impl GbnfField {
    fn list_rules<T: AsGrammar>(&self, f: &T) -> Vec<GbnfRule> {
        let list_rule = r#""[]" | "["   {SPACE}   {TYPE_NAME}   (","   {SPACE}   {TYPE_NAME})*   "]""#
            .replace("{SPACE}", &GbnfToken::Space.token())
            .replace("{TYPE_NAME}", &f.token());

        let mut rules = GbnfRule::single(self.token(), list_rule);
        rules.append(&mut f.rules());
        rules
    }

    fn optional_rules<T: AsGrammar>(&self, f: &T) -> Vec<GbnfRule> {
        let optional_rule = format!("{} | {}", f.token(), GbnfToken::Null.token());

        let mut rules = GbnfRule::single(self.token(), optional_rule);
        rules.append(&mut f.rules());
        rules.append(&mut GbnfToken::Null.rules());
        rules
    }
}

impl AsGrammar for GbnfField {
    fn token(&self) -> String {
        use GbnfFieldType::*;
        match &self.field_type {
            Primitive(f) => f.token(),
            OptionalPrimitive(f) => format!("{}OrNull", f.token()),
            PrimitiveList(f) => format!("{}List", f.token()),
            Complex(f) => f.token(),
            OptionalComplex(f) => format!("{}OrNull", f.token()),
            ComplexList(f) => format!("{}List", f.token()),
            Limited(f) => f.token(),
            OptionalLimited(f) => format!("{}OrNull", f.token()),
            LimitedList(f) => format!("{}List", f.token()),
        }
    }

    fn rules(&self) -> Vec<GbnfRule> {
        use GbnfFieldType::*;
        match &self.field_type {
            Primitive(f) => f.rules(),
            OptionalPrimitive(f) => self.optional_rules(f),
            PrimitiveList(f) => self.list_rules(f),
            Complex(f) => f.rules(),
            OptionalComplex(f) => self.optional_rules(f),
            ComplexList(f) => self.list_rules(f),
            Limited(f) => f.rules(),
            OptionalLimited(f) => self.optional_rules(f),
            LimitedList(f) => self.list_rules(f),
        }
    }
}

/// The complex type is a direct mapping from a supported Rust struct,
/// and also used to generate the root of a GBNF grammar.
#[derive(Debug)]
pub struct GbnfComplex {
    pub name: String,
    pub fields: Vec<GbnfField>,
}

impl GbnfComplex {
    pub fn to_grammar(&self) -> String {
        let mut rules = vec![GbnfRule::new("root".to_string(), self.name.clone())];
        rules.append(&mut self.rules());

        rules
            .into_iter()
            .unique()
            .map(|rule| format!("{} ::= {}", rule.name, rule.text))
            .join("\n")
    }
}

impl AsGrammar for GbnfComplex {
    fn rules(&self) -> Vec<GbnfRule> {
        // Full set of rules for the complex type, including the rules
        // of nested fields. Deduplication handled later.
        let field_rules_text = self
            .fields
            .iter()
            .map(|field| {
                format!(
                    r#"{}   "\"{}\":"   {}   {}"#,
                    GbnfToken::Space.token(),
                    field.field_name,
                    GbnfToken::Space.token(),
                    field.token(),
                )
            })
            .join(r#"   ","   "#);

        let rule = format!(r#""{{"   {}   {}   "}}""#, field_rules_text, GbnfToken::Space.token());

        let mut rules = GbnfRule::single(self.token(), rule);
        rules.append(&mut GbnfToken::Space.rules());

        for field in &self.fields {
            rules.append(&mut field.rules());
        }

        rules
    }

    fn token(&self) -> String {
        self.name.clone()
    }
}
