// Type descriptors for declared fields. No serde_json::Value here.

use std::fmt;
use std::str::FromStr;

use crate::error::TyParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Null,
    Bool,
    Int,                     // integral JSON numbers only
    Float,                   // any JSON number
    Str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    Scalar(Scalar),
    Object(String),          // by name; resolved against the registry on first use
    Sequence(Box<Ty>),
    Mapping(Box<Ty>, Box<Ty>),
    Union(Vec<Ty>),          // members in declared order; order decides ambiguous trials
    Any,                     // annotation-less fields
}

impl Scalar {
    pub fn name(self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool => "bool",
            Scalar::Int => "int",
            Scalar::Float => "float",
            Scalar::Str => "str",
        }
    }
}

impl Ty {
    pub fn int() -> Self { Ty::Scalar(Scalar::Int) }
    pub fn float() -> Self { Ty::Scalar(Scalar::Float) }
    pub fn str() -> Self { Ty::Scalar(Scalar::Str) }
    pub fn bool() -> Self { Ty::Scalar(Scalar::Bool) }
    pub fn null() -> Self { Ty::Scalar(Scalar::Null) }

    pub fn object(name: impl Into<String>) -> Self {
        Ty::Object(name.into())
    }

    pub fn seq(elem: Ty) -> Self {
        Ty::Sequence(Box::new(elem))
    }

    pub fn map(key: Ty, val: Ty) -> Self {
        Ty::Mapping(Box::new(key), Box::new(val))
    }

    /// Nested unions are flattened and repeated members dropped, keeping the
    /// first occurrence, so `Union[Union[A, B], null]` is `Union[A, B, null]`.
    pub fn union<I: IntoIterator<Item = Ty>>(members: I) -> Self {
        let mut flat = Vec::new();
        for member in members {
            match member {
                Ty::Union(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        let mut out: Vec<Ty> = Vec::with_capacity(flat.len());
        for member in flat {
            if !out.contains(&member) {
                out.push(member);
            }
        }
        Ty::Union(out)
    }

    /// `Optional[T]` is `Union[T, null]`.
    pub fn optional(inner: Ty) -> Self {
        Ty::union([inner, Ty::null()])
    }

    /// Union members with any hand-built nesting flattened, in declared order.
    pub fn flat_members(members: &[Ty]) -> Vec<&Ty> {
        let mut out = Vec::with_capacity(members.len());
        for member in members {
            match member {
                Ty::Union(inner) => out.extend(Ty::flat_members(inner)),
                other => out.push(other),
            }
        }
        out
    }

    /// Scalars and `Any` never need element-wise conversion.
    pub fn is_opaque(&self) -> bool {
        matches!(self, Ty::Scalar(_) | Ty::Any)
    }

    pub fn admits_null(&self) -> bool {
        match self {
            Ty::Any | Ty::Scalar(Scalar::Null) => true,
            Ty::Union(members) => members.iter().any(Ty::admits_null),
            _ => false,
        }
    }

    /// Every object name mentioned anywhere in this descriptor.
    pub fn object_refs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Ty::Object(name) => out.push(name),
            Ty::Sequence(elem) => elem.collect_refs(out),
            Ty::Mapping(k, v) => {
                k.collect_refs(out);
                v.collect_refs(out);
            }
            Ty::Union(members) => members.iter().for_each(|m| m.collect_refs(out)),
            Ty::Scalar(_) | Ty::Any => {}
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Scalar(s) => f.write_str(s.name()),
            Ty::Object(name) => f.write_str(name),
            Ty::Sequence(elem) => write!(f, "Sequence[{elem}]"),
            Ty::Mapping(k, v) => write!(f, "Mapping[{k}, {v}]"),
            Ty::Union(members) => {
                f.write_str("Union[")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 { f.write_str(", ")?; }
                    write!(f, "{m}")?;
                }
                f.write_str("]")
            }
            Ty::Any => f.write_str("Any"),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE EXPRESSIONS
// ————————————————————————————————————————————————————————————————————————————

/// Parses annotation strings such as `Sequence[PhotoSize]`,
/// `Union[int, str]`, `Integer or String`, `Array of Array of PhotoSize`
/// or a quoted forward reference like `'Message'`.
impl FromStr for Ty {
    type Err = TyParseError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        parse_expr(src, src)
    }
}

fn parse_expr(src: &str, whole: &str) -> Result<Ty, TyParseError> {
    let s = unquote(src.trim());
    if s.is_empty() {
        return Err(TyParseError::new(whole, "empty type expression"));
    }

    // lowest precedence: documentation-style `A or B`
    let alts = split_top_level(s, Sep::Or, whole)?;
    if alts.len() > 1 {
        let members = alts
            .into_iter()
            .map(|a| parse_expr(a, whole))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Ty::union(members));
    }

    if let Some(rest) = s.strip_prefix("Array of ") {
        return Ok(Ty::seq(parse_expr(rest, whole)?));
    }

    if let Some(open) = s.find('[') {
        let head = s[..open].trim();
        let inner = s[open + 1..]
            .strip_suffix(']')
            .ok_or_else(|| TyParseError::new(whole, "unbalanced brackets"))?;
        let args = split_top_level(inner, Sep::Comma, whole)?
            .into_iter()
            .map(|a| parse_expr(a, whole))
            .collect::<Result<Vec<_>, _>>()?;
        return generic(head, args, whole);
    }

    atom(s, whole)
}

fn generic(head: &str, mut args: Vec<Ty>, whole: &str) -> Result<Ty, TyParseError> {
    let arity = |n: usize, args: &Vec<Ty>| -> Result<(), TyParseError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(TyParseError::new(whole, format!("`{head}` takes {n} argument(s), got {}", args.len())))
        }
    };
    match head {
        "Sequence" | "List" | "list" | "Vec" => {
            arity(1, &args)?;
            Ok(Ty::seq(args.remove(0)))
        }
        "Mapping" | "Dict" | "dict" | "Map" => {
            arity(2, &args)?;
            let val = args.remove(1);
            let key = args.remove(0);
            Ok(Ty::map(key, val))
        }
        "Optional" => {
            arity(1, &args)?;
            Ok(Ty::optional(args.remove(0)))
        }
        "Union" => {
            if args.is_empty() {
                return Err(TyParseError::new(whole, "`Union` needs at least one member"));
            }
            Ok(Ty::union(args))
        }
        other => Err(TyParseError::new(whole, format!("unknown generic `{other}`"))),
    }
}

fn atom(s: &str, whole: &str) -> Result<Ty, TyParseError> {
    let ty = match s {
        "int" | "integer" | "Integer" => Ty::int(),
        "float" | "Float" | "Float number" | "number" => Ty::float(),
        "str" | "string" | "String" => Ty::str(),
        "bool" | "boolean" | "Boolean" | "True" | "False" => Ty::bool(),
        "null" | "None" | "NoneType" => Ty::null(),
        "Any" | "any" => Ty::Any,
        name => {
            let mut chars = name.chars();
            let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
            if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(TyParseError::new(whole, format!("`{name}` is not a type name")));
            }
            Ty::object(name)
        }
    };
    Ok(ty)
}

fn unquote(s: &str) -> &str {
    for q in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner.trim();
        }
    }
    s
}

#[derive(Clone, Copy)]
enum Sep { Comma, Or }

/// Split on a separator that sits outside any brackets.
fn split_top_level<'a>(s: &'a str, sep: Sep, whole: &str) -> Result<Vec<&'a str>, TyParseError> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth < 0 {
                    return Err(TyParseError::new(whole, "unbalanced brackets"));
                }
            }
            b',' if depth == 0 && matches!(sep, Sep::Comma) => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            b' ' if depth == 0 && matches!(sep, Sep::Or) && s[i..].starts_with(" or ") => {
                parts.push(&s[start..i]);
                i += " or ".len();
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    if depth != 0 {
        return Err(TyParseError::new(whole, "unbalanced brackets"));
    }
    parts.push(&s[start..]);
    Ok(parts)
}
