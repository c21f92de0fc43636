//! Packed double-precision width of the host CPU.

use roofline_core::SimdWidth;

/// Widest packed double-precision vector the CPU supports.
///
/// AVX-512F gives 512-bit, AVX 256-bit, SSE2 128-bit. AArch64 always has
/// 128-bit NEON. Anything else counts as scalar.
pub fn detect() -> SimdWidth {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("avx512f") {
            return SimdWidth::Packed512;
        }
        if is_x86_feature_detected!("avx") {
            return SimdWidth::Packed256;
        }
        if is_x86_feature_detected!("sse2") {
            return SimdWidth::Packed128;
        }
        SimdWidth::Scalar
    }

    #[cfg(target_arch = "aarch64")]
    {
        SimdWidth::Packed128
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
    {
        SimdWidth::Scalar
    }
}
