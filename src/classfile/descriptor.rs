//! Field and method descriptor helpers

use super::{ClassFileError, Result};

/// Internal class name referenced by a field descriptor, looking through
/// array dimensions. Primitive types yield `None`.
pub fn class_name_of(descriptor: &str) -> Option<&str> {
    let element = descriptor.trim_start_matches('[');
    element
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
}

/// Class named by a `new`/`checkcast`/`instanceof`/`anewarray` operand,
/// which is either an internal name or an array descriptor
pub fn operand_class_name(operand: &str) -> Option<&str> {
    if operand.starts_with('[') {
        class_name_of(operand)
    } else {
        Some(operand)
    }
}

/// Split one field descriptor off the front of `input`
fn split_type(input: &str) -> Result<(&str, &str)> {
    let bytes = input.as_bytes();
    let mut end = 0;
    while end < bytes.len() && bytes[end] == b'[' {
        end += 1;
    }
    match bytes.get(end) {
        Some(b'L') => {
            let close = input[end..]
                .find(';')
                .ok_or_else(|| ClassFileError::MalformedSignature(input.to_string()))?;
            let len = end + close + 1;
            Ok((&input[..len], &input[len..]))
        }
        Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V') => {
            Ok((&input[..end + 1], &input[end + 1..]))
        }
        _ => Err(ClassFileError::MalformedSignature(input.to_string())),
    }
}

/// Parameter and return type descriptors of a method descriptor
pub fn method_types(descriptor: &str) -> Result<(Vec<&str>, &str)> {
    let rest = descriptor
        .strip_prefix('(')
        .ok_or_else(|| ClassFileError::MalformedSignature(descriptor.to_string()))?;
    let close = rest
        .find(')')
        .ok_or_else(|| ClassFileError::MalformedSignature(descriptor.to_string()))?;
    let (mut params, ret) = (&rest[..close], &rest[close + 1..]);

    let mut types = Vec::new();
    while !params.is_empty() {
        let (ty, remaining) = split_type(params)?;
        types.push(ty);
        params = remaining;
    }
    let (ret_ty, trailing) = split_type(ret)?;
    if !trailing.is_empty() {
        return Err(ClassFileError::MalformedSignature(descriptor.to_string()));
    }
    Ok((types, ret_ty))
}

/// Every class named in a method descriptor, return type first
pub fn method_classes(descriptor: &str) -> Result<Vec<&str>> {
    let (params, ret) = method_types(descriptor)?;
    Ok(std::iter::once(ret)
        .chain(params)
        .filter_map(class_name_of)
        .collect())
}

pub fn is_method_descriptor(descriptor: &str) -> bool {
    descriptor.starts_with('(')
}

/// `com.example.Foo` to `com/example/Foo`
pub fn to_internal_name(java_name: &str) -> String {
    java_name.replace('.', "/")
}

/// `com/example/Foo` to `com.example.Foo`
pub fn to_java_name(internal_name: &str) -> String {
    internal_name.replace('/', ".")
}

/// Java source spelling of a field descriptor
pub fn java_type_name(descriptor: &str) -> String {
    let dims = descriptor.bytes().take_while(|b| *b == b'[').count();
    let element = &descriptor[dims..];
    let base = match element {
        "B" => "byte".to_string(),
        "C" => "char".to_string(),
        "D" => "double".to_string(),
        "F" => "float".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "S" => "short".to_string(),
        "Z" => "boolean".to_string(),
        "V" => "void".to_string(),
        other => class_name_of(other)
            .map(to_java_name)
            .unwrap_or_else(|| other.to_string()),
    };
    format!("{}{}", base, "[]".repeat(dims))
}

/// `ret name(arg,arg)` as written in ProGuard usage files
pub fn java_method_signature(name: &str, descriptor: &str) -> Result<String> {
    let (params, ret) = method_types(descriptor)?;
    let params: Vec<String> = params.into_iter().map(java_type_name).collect();
    Ok(format!("{} {}({})", java_type_name(ret), name, params.join(",")))
}
