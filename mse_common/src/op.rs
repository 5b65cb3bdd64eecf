/// Implements the standard arithmetic operator traits for a transparent
/// single-field newtype.
#[macro_export]
macro_rules! op {
    (binary $t:ty, $trait:ident, $method:ident) => {
        impl $trait for $t {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self::from($trait::$method(self.value(), rhs.value()))
            }
        }
    };
    (inplace $t:ty, $trait:ident, $method:ident, $via:ident) => {
        impl $trait for $t {
            fn $method(&mut self, rhs: Self) {
                *self = Self::from(self.value().$via(rhs.value()));
            }
        }
    };
    (unary $t:ty, $trait:ident, $method:ident) => {
        impl $trait for $t {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self::from($trait::$method(self.value()))
            }
        }
    };
}
