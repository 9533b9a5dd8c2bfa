//! Default shapes every value kind is seeded with.

use crate::registry::MetadataRegistry;
use crate::shape::Pair;

type S16<T> = [T; 16];
type S32<T> = Pair<S16<T>, S16<T>>;
type S64<T> = Pair<S32<T>, S32<T>>;
type S128<T> = Pair<S64<T>, S64<T>>;
type S256<T> = Pair<S128<T>, S128<T>>;
type S512<T> = Pair<S256<T>, S256<T>>;

macro_rules! arrays {
    ($registry:expr, $t:ty; $($n:literal => $binary:expr),+ $(,)?) => {
        $( $registry.register_shape::<[$t; $n]>($binary); )+
    };
}

/// Registers `[T; 1]` to `[T; 16]` as fundamentals (powers of two binary-eligible, the
/// rest exact-size only) and the doubling pairs from 32 up to 1024 slots.
pub fn register_standard<T: 'static>(registry: &MetadataRegistry<T>) {
    arrays!(registry, T;
        1 => true, 2 => true, 3 => false, 4 => true,
        5 => false, 6 => false, 7 => false, 8 => true,
        9 => false, 10 => false, 11 => false, 12 => false,
        13 => false, 14 => false, 15 => false, 16 => true,
    );

    registry.register_pair::<S16<T>, S16<T>>();
    registry.register_pair::<S32<T>, S32<T>>();
    registry.register_pair::<S64<T>, S64<T>>();
    registry.register_pair::<S128<T>, S128<T>>();
    registry.register_pair::<S256<T>, S256<T>>();
    registry.register_pair::<S512<T>, S512<T>>();
}

#[cfg(test)]
mod shapes_tests {
    use super::register_standard;
    use crate::registry::MetadataRegistry;

    #[test]
    fn standard_shapes_cover_small_counts_exactly() {
        let registry = MetadataRegistry::<u32>::new();
        register_standard(&registry);
        let stats = registry.stats();
        assert_eq!(16, stats.fundamentals);
        assert_eq!(5, stats.binary);
        assert_eq!(6, stats.constructors);
        assert_eq!(16, stats.max_span);
        for count in 1..=16usize {
            let d = registry.get_metadata(count).expect("fundamental");
            assert_eq!(count, d.capacity() as usize);
            assert_eq!(count.is_power_of_two(), d.is_binary(), "binary flag of {}", count);
        }
    }

    #[test]
    fn standard_shapes_compose_up_to_the_largest_pair() {
        let registry = MetadataRegistry::<u8>::new();
        register_standard(&registry);
        let d = registry.get_metadata(1024).expect("doubling chain reaches 1024");
        assert_eq!(1024, d.capacity());
        assert_eq!(1024, d.native_capacity());
        assert!(d.is_doubled());
        let d = registry.get_metadata(1000).expect("composable");
        assert_eq!(1000, d.capacity());
    }
}
