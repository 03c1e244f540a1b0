//! Two-way conversion between host values and foreign values.
//!
//! A host type takes part by implementing [`ToForeign`] (host to foreign, always succeeds
//! for a supported value) and [`FromForeign`] (foreign to host, returns `None` when the
//! foreign value has an incompatible type or does not fit). Together the two impls are the
//! type's conversion descriptor; adding a type never touches the existing impls.
//!
//! Composite conversions recurse element-wise and fail as a whole when any element fails.
//!
//! # Important
//! Foreign `bool` is a subclass of foreign `int`, so every integer conversion checks for
//! `bool` first and rejects it.

use std::{
    collections::{BTreeMap, HashMap},
    hash::{BuildHasher, Hash},
    ops::Range,
};

use indexmap::IndexMap;
use num_bigint::BigInt;
use pyo3::{
    prelude::*,
    types::{PyBool, PyByteArray, PyBytes, PyDict, PyFloat, PyInt, PyList, PyRange, PyRangeMethods, PySlice, PyString, PyTuple},
};

use crate::{
    context::Context,
    error::Result,
    handle::Handle,
    translate::{OrTranslate, Site},
};

/// Host to foreign half of a conversion descriptor.
///
/// Implementors only write [`ToForeign::to_object`]; [`ToForeign::to_foreign`] wraps the
/// result in a [`Handle`]. The trait is object safe so call arguments can be passed as
/// `&dyn ToForeign`.
pub trait ToForeign {
    /// Builds the foreign representation of `self`.
    ///
    /// Only fails when the interpreter itself fails, e.g. cannot allocate.
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>>;

    /// Builds the foreign representation of `self` and takes a handle on it.
    fn to_foreign(&self, cx: &Context<'_>) -> Result<Handle> {
        let object = self.to_object(cx).or_translate(cx, Site::Convert)?;
        Ok(cx.acquire(object))
    }
}

/// Foreign to host half of a conversion descriptor.
pub trait FromForeign: Sized {
    /// Reads a host value out of `object`, or `None` if it is not convertible.
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self>;

    /// Reads a host value out of the object `handle` refers to.
    fn from_foreign(handle: &Handle, cx: &Context<'_>) -> Option<Self> {
        Self::from_object(handle.bind(cx), cx)
    }
}

impl Handle {
    /// Converts the referenced value to `T`, or `None` if the foreign type does not fit.
    #[must_use]
    pub fn extract<T: FromForeign>(&self, cx: &Context<'_>) -> Option<T> {
        T::from_foreign(self, cx)
    }
}

impl<T: ToForeign + ?Sized> ToForeign for &T {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        (**self).to_object(cx)
    }
}

impl ToForeign for Handle {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        Ok(self.bind(cx).clone())
    }
}

impl FromForeign for Handle {
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        Some(cx.acquire(object.clone()))
    }
}

impl ToForeign for () {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        Ok(cx.py().None().into_bound(cx.py()))
    }
}

impl FromForeign for () {
    fn from_object<'py>(object: &Bound<'py, PyAny>, _cx: &Context<'py>) -> Option<Self> {
        object.is_none().then_some(())
    }
}

impl ToForeign for bool {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        Ok(PyBool::new(cx.py(), *self).to_owned().into_any())
    }
}

impl FromForeign for bool {
    fn from_object<'py>(object: &Bound<'py, PyAny>, _cx: &Context<'py>) -> Option<Self> {
        object.cast::<PyBool>().ok().map(|value| value.is_true())
    }
}

/// Whether `object` is a foreign integer and not a foreign bool.
fn is_integer(object: &Bound<'_, PyAny>) -> bool {
    object.is_instance_of::<PyInt>() && !object.is_instance_of::<PyBool>()
}

macro_rules! integer_conversions {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToForeign for $ty {
                fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
                    Ok(PyInt::new(cx.py(), *self).into_any())
                }
            }

            impl FromForeign for $ty {
                fn from_object<'py>(object: &Bound<'py, PyAny>, _cx: &Context<'py>) -> Option<Self> {
                    // out-of-range values raise OverflowError in the interpreter, which lands here as None
                    if is_integer(object) { object.extract::<$ty>().ok() } else { None }
                }
            }
        )*
    };
}

integer_conversions!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl ToForeign for BigInt {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        Ok(self.into_pyobject(cx.py())?.into_any())
    }
}

impl FromForeign for BigInt {
    fn from_object<'py>(object: &Bound<'py, PyAny>, _cx: &Context<'py>) -> Option<Self> {
        if is_integer(object) { object.extract::<Self>().ok() } else { None }
    }
}

impl ToForeign for f64 {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        Ok(PyFloat::new(cx.py(), *self).into_any())
    }
}

impl FromForeign for f64 {
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        if let Ok(float) = object.cast::<PyFloat>() {
            return Some(float.value());
        }
        if !is_integer(object) {
            return None;
        }
        // too large ints raise OverflowError; foreign int/float equality is exact
        let wide = object.extract::<Self>().ok()?;
        let exact = object.eq(PyFloat::new(cx.py(), wide)).ok()?;
        exact.then_some(wide)
    }
}

impl ToForeign for f32 {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        Ok(PyFloat::new(cx.py(), f64::from(*self)).into_any())
    }
}

impl FromForeign for f32 {
    #[expect(clippy::cast_possible_truncation, reason = "range is checked before narrowing")]
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        let wide = f64::from_object(object, cx)?;
        if wide.is_finite() && wide.abs() > f64::from(Self::MAX) {
            return None;
        }
        let narrowed = wide as Self;
        // floats round to the nearest f32, ints must survive unchanged
        if is_integer(object) && f64::from(narrowed).to_bits() != wide.to_bits() {
            return None;
        }
        Some(narrowed)
    }
}

impl ToForeign for str {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        Ok(PyString::new(cx.py(), self).into_any())
    }
}

impl ToForeign for String {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.as_str().to_object(cx)
    }
}

impl FromForeign for String {
    fn from_object<'py>(object: &Bound<'py, PyAny>, _cx: &Context<'py>) -> Option<Self> {
        let string = object.cast::<PyString>().ok()?;
        string.to_cow().ok().map(|text| text.into_owned())
    }
}

impl ToForeign for char {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        let mut buffer = [0; 4];
        self.encode_utf8(&mut buffer).to_object(cx)
    }
}

impl FromForeign for char {
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        let text = String::from_object(object, cx)?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(single), None) => Some(single),
            _ => None,
        }
    }
}

/// A byte buffer, converted to and from foreign `bytes`.
///
/// A plain `Vec<u8>` converts as a list of integers; wrap it in `Bytes` to get a buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// The buffer contents.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Unwraps the buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Bytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl ToForeign for Bytes {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        Ok(PyBytes::new(cx.py(), &self.0).into_any())
    }
}

impl FromForeign for Bytes {
    fn from_object<'py>(object: &Bound<'py, PyAny>, _cx: &Context<'py>) -> Option<Self> {
        if let Ok(bytes) = object.cast::<PyBytes>() {
            Some(Self(bytes.as_bytes().to_vec()))
        } else if let Ok(array) = object.cast::<PyByteArray>() {
            Some(Self(array.to_vec()))
        } else {
            None
        }
    }
}

impl<T: ToForeign> ToForeign for Option<T> {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        match self {
            Some(value) => value.to_object(cx),
            None => ().to_object(cx),
        }
    }
}

impl<T: FromForeign> FromForeign for Option<T> {
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        if object.is_none() {
            Some(None)
        } else {
            T::from_object(object, cx).map(Some)
        }
    }
}

impl<T: ToForeign> ToForeign for [T] {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        let list = PyList::empty(cx.py());
        for item in self {
            list.append(item.to_object(cx)?)?;
        }
        Ok(list.into_any())
    }
}

impl<T: ToForeign, const N: usize> ToForeign for [T; N] {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.as_slice().to_object(cx)
    }
}

impl<T: ToForeign> ToForeign for Vec<T> {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.as_slice().to_object(cx)
    }
}

/// Elements of a foreign `list` or `tuple`; other sequence-like types are not accepted.
fn sequence_items<'py>(object: &Bound<'py, PyAny>) -> Option<Vec<Bound<'py, PyAny>>> {
    if let Ok(list) = object.cast::<PyList>() {
        Some(list.iter().collect())
    } else if let Ok(tuple) = object.cast::<PyTuple>() {
        Some(tuple.iter().collect())
    } else {
        None
    }
}

impl<T: FromForeign> FromForeign for Vec<T> {
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        sequence_items(object)?
            .iter()
            .map(|item| T::from_object(item, cx))
            .collect()
    }
}

impl<A: ToForeign, B: ToForeign> ToForeign for (A, B) {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        let items = [self.0.to_object(cx)?, self.1.to_object(cx)?];
        Ok(PyTuple::new(cx.py(), items)?.into_any())
    }
}

impl<A: FromForeign, B: FromForeign> FromForeign for (A, B) {
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        match sequence_items(object)?.as_slice() {
            [a, b] => Some((A::from_object(a, cx)?, B::from_object(b, cx)?)),
            _ => None,
        }
    }
}

impl<A: ToForeign, B: ToForeign, C: ToForeign> ToForeign for (A, B, C) {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        let items = [self.0.to_object(cx)?, self.1.to_object(cx)?, self.2.to_object(cx)?];
        Ok(PyTuple::new(cx.py(), items)?.into_any())
    }
}

impl<A: FromForeign, B: FromForeign, C: FromForeign> FromForeign for (A, B, C) {
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        match sequence_items(object)?.as_slice() {
            [a, b, c] => Some((A::from_object(a, cx)?, B::from_object(b, cx)?, C::from_object(c, cx)?)),
            _ => None,
        }
    }
}

/// Builds a foreign `dict` from key/value pairs, preserving their order.
fn dict_from_pairs<'a, 'py, K, V>(
    cx: &Context<'py>,
    pairs: impl Iterator<Item = (&'a K, &'a V)>,
) -> PyResult<Bound<'py, PyAny>>
where
    K: ToForeign + 'a,
    V: ToForeign + 'a,
{
    let dict = PyDict::new(cx.py());
    for (key, value) in pairs {
        dict.set_item(key.to_object(cx)?, value.to_object(cx)?)?;
    }
    Ok(dict.into_any())
}

/// Converts every entry of a foreign `dict`, or `None` if any key or value does not fit.
fn dict_pairs<'py, K, V>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Vec<(K, V)>>
where
    K: FromForeign,
    V: FromForeign,
{
    let dict = object.cast::<PyDict>().ok()?;
    dict.iter()
        .map(|(key, value)| Some((K::from_object(&key, cx)?, V::from_object(&value, cx)?)))
        .collect()
}

impl<K: ToForeign, V: ToForeign, S> ToForeign for HashMap<K, V, S> {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        dict_from_pairs(cx, self.iter())
    }
}

impl<K, V, S> FromForeign for HashMap<K, V, S>
where
    K: FromForeign + Eq + Hash,
    V: FromForeign,
    S: BuildHasher + Default,
{
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        dict_pairs(object, cx).map(|pairs| pairs.into_iter().collect())
    }
}

impl<K: ToForeign, V: ToForeign> ToForeign for BTreeMap<K, V> {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        dict_from_pairs(cx, self.iter())
    }
}

impl<K: FromForeign + Ord, V: FromForeign> FromForeign for BTreeMap<K, V> {
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        dict_pairs(object, cx).map(|pairs| pairs.into_iter().collect())
    }
}

impl<K: ToForeign, V: ToForeign, S> ToForeign for IndexMap<K, V, S> {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        dict_from_pairs(cx, self.iter())
    }
}

impl<K, V, S> FromForeign for IndexMap<K, V, S>
where
    K: FromForeign + Eq + Hash,
    V: FromForeign,
    S: BuildHasher + Default,
{
    fn from_object<'py>(object: &Bound<'py, PyAny>, cx: &Context<'py>) -> Option<Self> {
        dict_pairs(object, cx).map(|pairs| pairs.into_iter().collect())
    }
}

/// Half-open ranges become foreign `slice(start, stop, 1)`.
impl ToForeign for Range<isize> {
    fn to_object<'py>(&self, cx: &Context<'py>) -> PyResult<Bound<'py, PyAny>> {
        Ok(PySlice::new(cx.py(), self.start, self.end, 1).into_any())
    }
}

/// Accepts a foreign `slice` with step `None` or `1` (a missing start reads as `0`), or a
/// foreign `range` with step `1`.
impl FromForeign for Range<isize> {
    fn from_object<'py>(object: &Bound<'py, PyAny>, _cx: &Context<'py>) -> Option<Self> {
        if let Ok(range) = object.cast::<PyRange>() {
            return (range.step().ok()? == 1).then_some(range.start().ok()?..range.stop().ok()?);
        }
        let slice = object.cast::<PySlice>().ok()?;
        let step = slice.getattr("step").ok()?;
        if !step.is_none() && step.extract::<isize>().ok()? != 1 {
            return None;
        }
        let start = slice.getattr("start").ok()?;
        let start = if start.is_none() { 0 } else { start.extract::<isize>().ok()? };
        let stop = slice.getattr("stop").ok()?.extract::<isize>().ok()?;
        Some(start..stop)
    }
}
