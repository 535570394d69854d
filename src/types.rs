/* Java type descriptors as they appear in DEX string data, e.g. Ljava/lang/Object; or [I */

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::char;
use nom::combinator::{all_consuming, map, value};
use nom::multi::many0;
use nom::sequence::{delimited, preceded, terminated};
use nom::{IResult, Parser};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dex::error::DexError;
use crate::jvm::insn::{ArrayKind, Kind};

/// Represents a Java class name, stored in internal form (`java/lang/Object`).
///
/// # Examples
///
/// ```
///  use dexrewrite::types::ObjectIdentifier;
///
///  let o = ObjectIdentifier::from_java_type("com.basic.Test");
///  assert_eq!(o.as_java_type(), "com.basic.Test");
///  assert_eq!(o.as_jni_type(), "Lcom/basic/Test;");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIdentifier {
    pub(crate) class_name: String,
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_jni_type())
    }
}

impl ObjectIdentifier {
    pub fn from_internal_name(name: &str) -> ObjectIdentifier {
        ObjectIdentifier { class_name: name.to_string() }
    }

    pub fn from_java_type(t: &str) -> ObjectIdentifier {
        ObjectIdentifier { class_name: t.replace('.', "/") }
    }

    pub fn internal_name(&self) -> &str {
        &self.class_name
    }

    pub fn as_jni_type(&self) -> String {
        format!("L{};", self.class_name)
    }

    pub fn as_java_type(&self) -> String {
        self.class_name.replace('/', ".")
    }
}

/// Represents a Java type: array, object or primitive type
///
/// # Examples
///
/// ```
///  use dexrewrite::types::TypeSignature;
///
///  let t = TypeSignature::from_descriptor("[Z").unwrap();
///  assert_eq!(t.to_jni(), "[Z");
///  assert!(t.is_reference());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSignature {
    Array(Box<TypeSignature>),
    Object(ObjectIdentifier),
    Int,
    Bool,
    Byte,
    Char,
    Short,
    Long,
    Float,
    Double,
    Void,
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_jni())
    }
}

impl TypeSignature {
    pub fn from_descriptor(s: &str) -> Result<TypeSignature, DexError> {
        match all_consuming(parse_typesignature)(s) {
            Ok((_, ts)) => Ok(ts),
            Err(_) => fail!("Malformed type descriptor '{}'", s),
        }
    }

    pub fn object(internal_name: &str) -> TypeSignature {
        TypeSignature::Object(ObjectIdentifier::from_internal_name(internal_name))
    }

    pub fn to_jni(&self) -> String {
        match self {
            TypeSignature::Array(a) => "[".to_string() + &a.to_jni(),
            TypeSignature::Bool => "Z".to_string(),
            TypeSignature::Byte => "B".to_string(),
            TypeSignature::Char => "C".to_string(),
            TypeSignature::Short => "S".to_string(),
            TypeSignature::Int => "I".to_string(),
            TypeSignature::Long => "J".to_string(),
            TypeSignature::Float => "F".to_string(),
            TypeSignature::Double => "D".to_string(),
            TypeSignature::Object(o) => o.as_jni_type(),
            TypeSignature::Void => "V".to_string(),
        }
    }

    pub fn to_java(&self) -> String {
        match self {
            TypeSignature::Array(a) => format!("{}[]", a.to_java()),
            TypeSignature::Bool => "boolean".to_string(),
            TypeSignature::Byte => "byte".to_string(),
            TypeSignature::Char => "char".to_string(),
            TypeSignature::Short => "short".to_string(),
            TypeSignature::Int => "int".to_string(),
            TypeSignature::Long => "long".to_string(),
            TypeSignature::Float => "float".to_string(),
            TypeSignature::Double => "double".to_string(),
            TypeSignature::Object(o) => o.as_java_type(),
            TypeSignature::Void => "void".to_string(),
        }
    }

    /// The name used by class references in JVM instructions: the internal name for
    /// classes, the full descriptor for arrays.
    pub fn internal_name(&self) -> String {
        match self {
            TypeSignature::Object(o) => o.class_name.clone(),
            _ => self.to_jni(),
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, TypeSignature::Long | TypeSignature::Double)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TypeSignature::Array(_) | TypeSignature::Object(_))
    }

    /// Number of local variable slots the type occupies.
    pub fn slots(&self) -> u16 {
        match self {
            TypeSignature::Void => 0,
            t if t.is_wide() => 2,
            _ => 1,
        }
    }

    /// The computational kind of a value of this type; `None` for void.
    pub fn kind(&self) -> Option<Kind> {
        Some(match self {
            TypeSignature::Bool | TypeSignature::Byte | TypeSignature::Char | TypeSignature::Short | TypeSignature::Int => Kind::Int,
            TypeSignature::Long => Kind::Long,
            TypeSignature::Float => Kind::Float,
            TypeSignature::Double => Kind::Double,
            TypeSignature::Array(_) | TypeSignature::Object(_) => Kind::Reference,
            TypeSignature::Void => return None,
        })
    }

    /// Element access kind when this type is the component type of an array.
    pub fn array_kind(&self) -> Option<ArrayKind> {
        Some(match self {
            TypeSignature::Bool | TypeSignature::Byte => ArrayKind::Byte,
            TypeSignature::Char => ArrayKind::Char,
            TypeSignature::Short => ArrayKind::Short,
            TypeSignature::Int => ArrayKind::Int,
            TypeSignature::Long => ArrayKind::Long,
            TypeSignature::Float => ArrayKind::Float,
            TypeSignature::Double => ArrayKind::Double,
            TypeSignature::Array(_) | TypeSignature::Object(_) => ArrayKind::Reference,
            TypeSignature::Void => return None,
        })
    }

    pub fn element_type(&self) -> Option<&TypeSignature> {
        match self {
            TypeSignature::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            TypeSignature::Array(a) => 1 + a.dimensions(),
            _ => 0,
        }
    }
}

/// Represents a Java method descriptor consisting of arguments and a return type
///
/// # Examples
///
/// ```
///  use dexrewrite::types::{MethodSignature, TypeSignature};
///
///  let m = MethodSignature::from_descriptor("([IJ)V").unwrap();
///  assert_eq!(m.result, TypeSignature::Void);
///  assert_eq!(m.arg_slots(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub args: Vec<TypeSignature>,
    pub result: TypeSignature,
}

impl MethodSignature {
    pub fn from_descriptor(s: &str) -> Result<MethodSignature, DexError> {
        match all_consuming(parse_methodsignature)(s) {
            Ok((_, m)) => Ok(m),
            Err(_) => fail!("Malformed method descriptor '{}'", s),
        }
    }

    pub fn to_jni(&self) -> String {
        let mut s = String::from("(");
        for t in &self.args {
            s.push_str(&t.to_jni());
        }
        s.push(')');
        s.push_str(&self.result.to_jni());
        s
    }

    /// Local variable slots taken by the arguments, excluding `this`.
    pub fn arg_slots(&self) -> u16 {
        self.args.iter().map(|a| a.slots()).sum()
    }
}

fn parse_object(input: &str) -> IResult<&str, TypeSignature> {
    map(
        delimited(char('L'), take_while1(|c| c != ';'), char(';')),
        |name: &str| TypeSignature::Object(ObjectIdentifier::from_internal_name(name)),
    )(input)
}

fn parse_primitive(input: &str) -> IResult<&str, TypeSignature> {
    alt((
        value(TypeSignature::Bool, char('Z')),
        value(TypeSignature::Byte, char('B')),
        value(TypeSignature::Char, char('C')),
        value(TypeSignature::Short, char('S')),
        value(TypeSignature::Int, char('I')),
        value(TypeSignature::Long, char('J')),
        value(TypeSignature::Float, char('F')),
        value(TypeSignature::Double, char('D')),
        value(TypeSignature::Void, char('V')),
    ))(input)
}

pub(crate) fn parse_typesignature(input: &str) -> IResult<&str, TypeSignature> {
    alt((
        map(preceded(char('['), parse_typesignature), |t| TypeSignature::Array(Box::new(t))),
        parse_object,
        parse_primitive,
    ))
    .parse(input)
}

pub(crate) fn parse_methodsignature(input: &str) -> IResult<&str, MethodSignature> {
    let (o, args) = delimited(tag("("), many0(parse_typesignature), tag(")"))(input)?;
    let (o, result) = terminated(parse_typesignature, nom::combinator::eof)(o)?;
    Ok((o, MethodSignature { args, result }))
}
