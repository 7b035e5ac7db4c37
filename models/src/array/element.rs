use crate::DType;

/// A Rust scalar that maps onto a wire element type.
///
/// Values are written in native byte order, row-major, which is how the viewer
/// reads the binary payload.
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn extend_ne_bytes(values: &[Self], out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                fn extend_ne_bytes(values: &[Self], out: &mut Vec<u8>) {
                    out.reserve(values.len() * size_of::<$ty>());
                    for value in values {
                        out.extend_from_slice(&value.to_ne_bytes());
                    }
                }
            }
        )*
    };
}

impl_element!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn extend_ne_bytes(values: &[Self], out: &mut Vec<u8>) {
        out.extend(values.iter().map(|&value| u8::from(value)));
    }
}
