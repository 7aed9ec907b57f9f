use ethereum_types::U512;
use web3::types::U256;

/// Floor of `a · b / c` with a full-width intermediate product.
///
/// Returns zero when `c` is zero (degenerate orders) and saturates to
/// [`U256::max_value`] when the quotient does not fit.
pub fn mul_div_floor(a: U256, b: U256, c: U256) -> U256 {
    if c.is_zero() {
        return U256::zero();
    }
    let quotient = a.full_mul(b) / U512::from(c);
    if quotient > U512::from(U256::max_value()) {
        return U256::max_value();
    }
    let mut bytes = [0_u8; 64];
    quotient.to_big_endian(&mut bytes);
    U256::from_big_endian(&bytes[32..])
}

#[cfg(test)]
pub mod test {
    use pretty_assertions::assert_eq;
    use proptest::proptest;

    use super::*;

    #[test]
    fn test_floors() {
        assert_eq!(
            mul_div_floor(U256::from(10), U256::from(3), U256::from(4)),
            U256::from(7)
        );
        assert_eq!(
            mul_div_floor(U256::from(1), U256::from(1), U256::from(2)),
            U256::zero()
        );
    }

    #[test]
    fn test_zero_divisor() {
        assert_eq!(
            mul_div_floor(U256::from(10), U256::from(3), U256::zero()),
            U256::zero()
        );
    }

    #[test]
    fn test_no_intermediate_overflow() {
        let max = U256::max_value();
        assert_eq!(mul_div_floor(max, max, max), max);
        assert_eq!(
            mul_div_floor(max, U256::from(2), U256::from(4)),
            max / U256::from(2)
        );
    }

    #[test]
    fn test_saturates() {
        let max = U256::max_value();
        assert_eq!(mul_div_floor(max, U256::from(4), U256::from(2)), max);
    }

    #[test]
    fn test_with_proptest() {
        proptest!(|(a in 0_u64.., b in 0_u64.., c in 1_u64..)| {
            let expected = u128::from(a) * u128::from(b) / u128::from(c);
            assert_eq!(
                mul_div_floor(U256::from(a), U256::from(b), U256::from(c)),
                U256::from(expected)
            );
        });
    }
}
