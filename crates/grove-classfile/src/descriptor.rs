//! Field and method descriptors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Malformed descriptor '{0}'")]
pub struct DescriptorError(pub String);

/// A parsed field type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// One of `B C D F I J S Z`
    Base(char),
    /// Internal class name
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Number of stack/local slots a value of this type uses
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Base('J') | FieldType::Base('D') => 2,
            _ => 1,
        }
    }

    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let mut chars = descriptor.chars().peekable();
        let ty = parse_field(&mut chars).ok_or_else(|| DescriptorError(descriptor.to_string()))?;
        if chars.next().is_some() {
            return Err(DescriptorError(descriptor.to_string()));
        }
        Ok(ty)
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `void`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let err = || DescriptorError(descriptor.to_string());
        let mut chars = descriptor.chars().peekable();
        if chars.next() != Some('(') {
            return Err(err());
        }
        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => params.push(parse_field(&mut chars).ok_or_else(err)?),
                None => return Err(err()),
            }
        }
        let ret = if chars.peek() == Some(&'V') {
            chars.next();
            None
        } else {
            Some(parse_field(&mut chars).ok_or_else(err)?)
        };
        if chars.next().is_some() {
            return Err(err());
        }
        Ok(Self { params, ret })
    }

    /// Slots taken by the arguments (excluding `this`)
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slots).sum()
    }

    /// Slots taken by the return value
    pub fn return_slots(&self) -> u16 {
        self.ret.as_ref().map_or(0, FieldType::slots)
    }
}

fn parse_field(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<FieldType> {
    match chars.next()? {
        c @ ('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => Some(FieldType::Base(c)),
        'L' => {
            let mut name = String::new();
            loop {
                match chars.next()? {
                    ';' => break,
                    c => name.push(c),
                }
            }
            (!name.is_empty()).then_some(FieldType::Object(name))
        }
        '[' => Some(FieldType::Array(Box::new(parse_field(chars)?))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_descriptor() {
        let desc = MethodDescriptor::parse("(IJ[Ljava/lang/String;D)Ljava/lang/Object;").unwrap();
        assert_eq!(desc.params.len(), 4);
        assert_eq!(desc.arg_slots(), 6);
        assert_eq!(desc.return_slots(), 1);
    }

    #[test]
    fn test_void_return() {
        let desc = MethodDescriptor::parse("()V").unwrap();
        assert!(desc.params.is_empty());
        assert_eq!(desc.ret, None);
    }

    #[test]
    fn test_malformed() {
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(FieldType::parse("Ljava/lang/Object").is_err());
        assert!(FieldType::parse("II").is_err());
    }
}
