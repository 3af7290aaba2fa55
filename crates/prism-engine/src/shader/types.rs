//! Uniform value types.
//!
//! [`UniformType`] is the engine's view of a GL uniform type tag.
//! [`UniformValue`] ties a Rust type to exactly one tag, and is the bound on
//! every typed get/set in the engine.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, IVec3, IVec4, Mat2, Mat3, Mat4, UVec2, UVec3, UVec4, Vec2, Vec3, Vec4};

/// Declared type of an active uniform.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Uint,
    UVec2,
    UVec3,
    UVec4,
    Mat2,
    Mat2x3,
    Mat2x4,
    Mat3,
    Mat3x2,
    Mat3x4,
    Mat4,
    Mat4x2,
    Mat4x3,
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    /// Any other type the driver reports (bools, shadow samplers, images...).
    Unsupported(u32),
}

/// Scalar layout of a uniform, used to pick the driver entry point.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UniformShape {
    /// `width` floats.
    Float { width: usize },
    /// `width` signed ints. Samplers are a single int (texture unit).
    Int { width: usize },
    /// `width` unsigned ints.
    Uint { width: usize },
    /// Column-major float matrix.
    Matrix { columns: usize, rows: usize },
    Unsupported,
}

impl UniformType {
    /// Maps a GL type enum. Never fails; unknown tags become `Unsupported`.
    pub fn from_gl(tag: u32) -> Self {
        match tag {
            glow::FLOAT => Self::Float,
            glow::FLOAT_VEC2 => Self::Vec2,
            glow::FLOAT_VEC3 => Self::Vec3,
            glow::FLOAT_VEC4 => Self::Vec4,
            glow::INT => Self::Int,
            glow::INT_VEC2 => Self::IVec2,
            glow::INT_VEC3 => Self::IVec3,
            glow::INT_VEC4 => Self::IVec4,
            glow::UNSIGNED_INT => Self::Uint,
            glow::UNSIGNED_INT_VEC2 => Self::UVec2,
            glow::UNSIGNED_INT_VEC3 => Self::UVec3,
            glow::UNSIGNED_INT_VEC4 => Self::UVec4,
            glow::FLOAT_MAT2 => Self::Mat2,
            glow::FLOAT_MAT2x3 => Self::Mat2x3,
            glow::FLOAT_MAT2x4 => Self::Mat2x4,
            glow::FLOAT_MAT3 => Self::Mat3,
            glow::FLOAT_MAT3x2 => Self::Mat3x2,
            glow::FLOAT_MAT3x4 => Self::Mat3x4,
            glow::FLOAT_MAT4 => Self::Mat4,
            glow::FLOAT_MAT4x2 => Self::Mat4x2,
            glow::FLOAT_MAT4x3 => Self::Mat4x3,
            glow::SAMPLER_1D => Self::Sampler1D,
            glow::SAMPLER_2D => Self::Sampler2D,
            glow::SAMPLER_3D => Self::Sampler3D,
            glow::SAMPLER_CUBE => Self::SamplerCube,
            other => Self::Unsupported(other),
        }
    }

    /// Inverse of [`from_gl`](Self::from_gl).
    pub fn gl_enum(self) -> u32 {
        match self {
            Self::Float => glow::FLOAT,
            Self::Vec2 => glow::FLOAT_VEC2,
            Self::Vec3 => glow::FLOAT_VEC3,
            Self::Vec4 => glow::FLOAT_VEC4,
            Self::Int => glow::INT,
            Self::IVec2 => glow::INT_VEC2,
            Self::IVec3 => glow::INT_VEC3,
            Self::IVec4 => glow::INT_VEC4,
            Self::Uint => glow::UNSIGNED_INT,
            Self::UVec2 => glow::UNSIGNED_INT_VEC2,
            Self::UVec3 => glow::UNSIGNED_INT_VEC3,
            Self::UVec4 => glow::UNSIGNED_INT_VEC4,
            Self::Mat2 => glow::FLOAT_MAT2,
            Self::Mat2x3 => glow::FLOAT_MAT2x3,
            Self::Mat2x4 => glow::FLOAT_MAT2x4,
            Self::Mat3 => glow::FLOAT_MAT3,
            Self::Mat3x2 => glow::FLOAT_MAT3x2,
            Self::Mat3x4 => glow::FLOAT_MAT3x4,
            Self::Mat4 => glow::FLOAT_MAT4,
            Self::Mat4x2 => glow::FLOAT_MAT4x2,
            Self::Mat4x3 => glow::FLOAT_MAT4x3,
            Self::Sampler1D => glow::SAMPLER_1D,
            Self::Sampler2D => glow::SAMPLER_2D,
            Self::Sampler3D => glow::SAMPLER_3D,
            Self::SamplerCube => glow::SAMPLER_CUBE,
            Self::Unsupported(tag) => tag,
        }
    }

    pub fn shape(self) -> UniformShape {
        use UniformShape::*;
        match self {
            Self::Float => Float { width: 1 },
            Self::Vec2 => Float { width: 2 },
            Self::Vec3 => Float { width: 3 },
            Self::Vec4 => Float { width: 4 },
            Self::Int => Int { width: 1 },
            Self::IVec2 => Int { width: 2 },
            Self::IVec3 => Int { width: 3 },
            Self::IVec4 => Int { width: 4 },
            Self::Uint => Uint { width: 1 },
            Self::UVec2 => Uint { width: 2 },
            Self::UVec3 => Uint { width: 3 },
            Self::UVec4 => Uint { width: 4 },
            Self::Mat2 => Matrix { columns: 2, rows: 2 },
            Self::Mat2x3 => Matrix { columns: 2, rows: 3 },
            Self::Mat2x4 => Matrix { columns: 2, rows: 4 },
            Self::Mat3 => Matrix { columns: 3, rows: 3 },
            Self::Mat3x2 => Matrix { columns: 3, rows: 2 },
            Self::Mat3x4 => Matrix { columns: 3, rows: 4 },
            Self::Mat4 => Matrix { columns: 4, rows: 4 },
            Self::Mat4x2 => Matrix { columns: 4, rows: 2 },
            Self::Mat4x3 => Matrix { columns: 4, rows: 3 },
            Self::Sampler1D | Self::Sampler2D | Self::Sampler3D | Self::SamplerCube => {
                Int { width: 1 }
            }
            Self::Unsupported(_) => UniformShape::Unsupported,
        }
    }

    /// Size in bytes of one value, matching the native scalar layout.
    /// `0` for unsupported types.
    pub fn byte_size(self) -> usize {
        self.word_count() * 4
    }

    /// Size in 32-bit words of one value.
    pub fn word_count(self) -> usize {
        match self.shape() {
            UniformShape::Float { width }
            | UniformShape::Int { width }
            | UniformShape::Uint { width } => width,
            UniformShape::Matrix { columns, rows } => columns * rows,
            UniformShape::Unsupported => 0,
        }
    }

    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            Self::Sampler1D | Self::Sampler2D | Self::Sampler3D | Self::SamplerCube
        )
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }

    /// Whether a value of type `requested` may be stored in a uniform of this
    /// declared type: exact match, or an `Int` written to any sampler.
    pub fn accepts(self, requested: UniformType) -> bool {
        self.is_supported()
            && (self == requested || (requested == Self::Int && self.is_sampler()))
    }
}

/// A Rust type that maps to exactly one [`UniformType`].
///
/// `size_of::<Self>()` must equal `UNIFORM_TYPE.byte_size()`.
pub trait UniformValue: Pod {
    const UNIFORM_TYPE: UniformType;
}

macro_rules! uniform_value {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl UniformValue for $ty {
            const UNIFORM_TYPE: UniformType = UniformType::$tag;
        })*
    };
}

uniform_value! {
    f32 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    i32 => Int,
    IVec2 => IVec2,
    IVec3 => IVec3,
    IVec4 => IVec4,
    u32 => Uint,
    UVec2 => UVec2,
    UVec3 => UVec3,
    UVec4 => UVec4,
    Mat2 => Mat2,
    Mat3 => Mat3,
    Mat4 => Mat4,
    Mat2x3 => Mat2x3,
    Mat2x4 => Mat2x4,
    Mat3x2 => Mat3x2,
    Mat3x4 => Mat3x4,
    Mat4x2 => Mat4x2,
    Mat4x3 => Mat4x3,
}

macro_rules! non_square_matrix {
    ($($(#[$doc:meta])* $name:ident: $cols:literal x $rows:literal),* $(,)?) => {
        $(
            $(#[$doc])*
            #[repr(C)]
            #[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
            pub struct $name(pub [[f32; $rows]; $cols]);

            impl $name {
                pub const ZERO: Self = Self([[0.0; $rows]; $cols]);

                pub fn from_cols(cols: [[f32; $rows]; $cols]) -> Self {
                    Self(cols)
                }
            }
        )*
    };
}

non_square_matrix! {
    /// 2 columns of 3 rows (GLSL `mat2x3`).
    Mat2x3: 2 x 3,
    /// 2 columns of 4 rows (GLSL `mat2x4`).
    Mat2x4: 2 x 4,
    /// 3 columns of 2 rows (GLSL `mat3x2`).
    Mat3x2: 3 x 2,
    /// 3 columns of 4 rows (GLSL `mat3x4`).
    Mat3x4: 3 x 4,
    /// 4 columns of 2 rows (GLSL `mat4x2`).
    Mat4x2: 4 x 2,
    /// 4 columns of 3 rows (GLSL `mat4x3`).
    Mat4x3: 4 x 3,
}
