//! N-ary joins and string templating over outputs.
//!
//! All joins fold their inputs with the same algebra as bind: resources
//! union, known AND, secret OR. Positions are always preserved. A typed join
//! whose inputs include an absent payload has an absent payload itself;
//! dynamic joins over [`Property`] keep the slot and fill it with
//! [`Property::Null`].

use super::{Accumulator, Output};
use crate::error::{Error, Result};
use crate::property::Property;
use futures::future::join_all;
use indexmap::IndexMap;
use std::fmt::Display;

impl<T> Output<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Join a list of outputs into an output of a list, order preserved.
    pub fn all<I>(outputs: I) -> Output<Vec<T>>
    where
        I: IntoIterator<Item = Output<T>>,
    {
        let pending: Vec<_> = outputs.into_iter().map(|o| o.data()).collect();
        Output::from_data_future(async move {
            let mut acc = Accumulator::new();
            let values: Vec<Option<T>> = join_all(pending)
                .await
                .into_iter()
                .map(|d| acc.take(d))
                .collect();
            acc.finish(values.into_iter().collect::<Option<Vec<T>>>())
        })
    }

    /// Join a string-keyed map of outputs, insertion order preserved.
    pub fn all_map<K>(outputs: IndexMap<K, Output<T>>) -> Output<IndexMap<K, T>>
    where
        K: Clone + std::hash::Hash + Eq + Send + Sync + 'static,
    {
        let (keys, pending): (Vec<K>, Vec<_>) =
            outputs.into_iter().map(|(k, o)| (k, o.data())).unzip();
        Output::from_data_future(async move {
            let mut acc = Accumulator::new();
            let values: Vec<Option<T>> = join_all(pending)
                .await
                .into_iter()
                .map(|d| acc.take(d))
                .collect();
            let joined = keys
                .into_iter()
                .zip(values)
                .map(|(k, v)| v.map(|v| (k, v)))
                .collect::<Option<IndexMap<K, T>>>();
            acc.finish(joined)
        })
    }
}

impl<T> Output<T>
where
    T: Display + Clone + Send + Sync + 'static,
{
    /// Render the payload with its `Display` implementation.
    pub fn stringify(&self) -> Output<String> {
        self.convert(|v| v.to_string())
    }
}

impl Output<String> {
    /// Interpolate outputs into a template.
    ///
    /// `{}` takes the next argument, `{N}` the N-th; `{{` and `}}` are
    /// literal braces. The result is unknown if any argument is unknown and
    /// secret if any argument is secret.
    pub fn format(template: &str, args: Vec<Output<String>>) -> Result<Output<String>> {
        let segments = parse_template(template, args.len())?;
        Ok(Output::all(args).apply(move |values| render(&segments, &values)))
    }
}

impl Output<Property> {
    /// Join dynamic outputs into a list property. Absent payloads become
    /// `Property::Null` in place.
    pub fn join_list<I>(outputs: I) -> Output<Property>
    where
        I: IntoIterator<Item = Output<Property>>,
    {
        let pending: Vec<_> = outputs.into_iter().map(|o| o.data()).collect();
        Output::from_data_future(async move {
            let mut acc = Accumulator::new();
            let items: Vec<Property> = join_all(pending)
                .await
                .into_iter()
                .map(|d| acc.take(d).unwrap_or(Property::Null))
                .collect();
            acc.finish(Some(Property::List(items)))
        })
    }

    /// Join dynamic outputs into a map property.
    pub fn join_map(outputs: IndexMap<String, Output<Property>>) -> Output<Property> {
        let (keys, pending): (Vec<String>, Vec<_>) =
            outputs.into_iter().map(|(k, o)| (k, o.data())).unzip();
        Output::from_data_future(async move {
            let mut acc = Accumulator::new();
            let entries: IndexMap<String, Property> = keys
                .into_iter()
                .zip(join_all(pending).await)
                .map(|(k, d)| (k, acc.take(d).unwrap_or(Property::Null)))
                .collect();
            acc.finish(Some(Property::Map(entries)))
        })
    }
}

macro_rules! tuple_fn {
    ($(#[$meta:meta])* $name:ident; $($ty:ident $arg:ident),+) => {
        $(#[$meta])*
        pub fn $name<$($ty),+>($($arg: &Output<$ty>),+) -> Output<($($ty,)+)>
        where
            $($ty: Clone + Send + Sync + 'static),+
        {
            $(let $arg = $arg.data();)+
            Output::from_data_future(async move {
                let ($($arg,)+) = futures::join!($($arg),+);
                let mut acc = Accumulator::new();
                $(let $arg = acc.take($arg);)+
                let value = match ($($arg,)+) {
                    ($(Some($arg),)+) => Some(($($arg,)+)),
                    _ => None,
                };
                acc.finish(value)
            })
        }
    };
}

tuple_fn!(
    /// Join two outputs of different types.
    tuple2; A a, B b
);
tuple_fn!(tuple3; A a, B b, C c);
tuple_fn!(tuple4; A a, B b, C c, D d);
tuple_fn!(tuple5; A a, B b, C c, D d, E e);
tuple_fn!(tuple6; A a, B b, C c, D d, E e, F f);

/// Piece of a parsed template.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Arg(usize),
}

fn parse_template(template: &str, arg_count: usize) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut next_arg = 0;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut spec = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => spec.push(ch),
                        None => {
                            return Err(Error::InvalidTemplate(format!(
                                "unclosed placeholder in '{}'",
                                template
                            )))
                        }
                    }
                }
                let index = if spec.trim().is_empty() {
                    let i = next_arg;
                    next_arg += 1;
                    i
                } else {
                    spec.trim().parse::<usize>().map_err(|_| {
                        Error::InvalidTemplate(format!("bad placeholder '{{{}}}'", spec))
                    })?
                };
                if index >= arg_count {
                    return Err(Error::InvalidTemplate(format!(
                        "placeholder {} out of range ({} arguments)",
                        index, arg_count
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Arg(index));
            }
            '}' => {
                return Err(Error::InvalidTemplate(format!(
                    "unmatched '}}' in '{}'",
                    template
                )))
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn render(segments: &[Segment], values: &[String]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Arg(i) => out.push_str(&values[*i]),
        }
    }
    out
}
