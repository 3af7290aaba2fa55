use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::shader::UniformValue;

/// Handle of one property inside a [`Material`](super::Material).
///
/// The value is the property's word offset in the material's value pool.
/// Offsets are assigned on first lookup and never move.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub(crate) u32);

impl PropertyId {
    /// Word offset into the value pool.
    pub fn offset(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Property lookup key: an existing id, or a uniform name to resolve.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PropertyKey<'a> {
    Id(PropertyId),
    Name(&'a str),
}

impl From<PropertyId> for PropertyKey<'_> {
    fn from(id: PropertyId) -> Self {
        PropertyKey::Id(id)
    }
}

impl<'a> From<&'a str> for PropertyKey<'a> {
    fn from(name: &'a str) -> Self {
        PropertyKey::Name(name)
    }
}

impl<'a> From<&'a String> for PropertyKey<'a> {
    fn from(name: &'a String) -> Self {
        PropertyKey::Name(name)
    }
}

/// Typed mutable view of one property's stored value.
///
/// Holds the material mutably borrowed, so the pool cannot grow (and the view
/// cannot dangle) while it is alive.
pub struct PropertyMut<'a, T: UniformValue> {
    words: &'a mut [u32],
    _ty: PhantomData<T>,
}

impl<'a, T: UniformValue> PropertyMut<'a, T> {
    pub(crate) fn new(words: &'a mut [u32]) -> Self {
        debug_assert_eq!(words.len() * 4, size_of::<T>());
        Self {
            words,
            _ty: PhantomData,
        }
    }
}

impl<T: UniformValue> Deref for PropertyMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        bytemuck::from_bytes(bytemuck::cast_slice(&*self.words))
    }
}

impl<T: UniformValue> DerefMut for PropertyMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        bytemuck::from_bytes_mut(bytemuck::cast_slice_mut(&mut *self.words))
    }
}

impl<T: UniformValue + fmt::Debug> fmt::Debug for PropertyMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyMut").field(&**self).finish()
    }
}
