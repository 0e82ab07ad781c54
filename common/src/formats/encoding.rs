//! Key value quantization for compiled animations

use glam::{Quat, Vec3};
use half::f16;

// ============================================================================
// Quaternion Encoding: Smallest-Three
// ============================================================================

/// Quantization steps on each side of zero for a 10-bit component
const QUAT_STEPS: f32 = 511.0;

/// Encode a quaternion using smallest-three encoding (32 bits)
///
/// Drops the largest component and reconstructs it from the other three.
///
/// Bit layout: `[a:10][b:10][c:10][idx:2]`
/// - idx identifies which component was dropped (largest)
/// - a, b, c are the three smallest components quantized to 10 bits
///
/// Quantization: `round(v * √2 * 511) + 511` for the [0, 1022] range, so 0 is
/// stored exactly
pub fn encode_quat_smallest_three(q: Quat) -> u32 {
    let q = q.to_array();

    // 1. Find index of largest absolute component
    let abs_q = q.map(f32::abs);
    let idx = if abs_q[0] > abs_q[1] && abs_q[0] > abs_q[2] && abs_q[0] > abs_q[3] {
        0
    } else if abs_q[1] > abs_q[2] && abs_q[1] > abs_q[3] {
        1
    } else if abs_q[2] > abs_q[3] {
        2
    } else {
        3
    };

    // 2. Ensure largest component is positive (q == -q for rotations)
    let sign = if q[idx] < 0.0 { -1.0 } else { 1.0 };
    let q = q.map(|c| c * sign);

    // 3. Select the 3 smallest components (skip idx)
    let (a, b, c) = match idx {
        0 => (q[1], q[2], q[3]),
        1 => (q[0], q[2], q[3]),
        2 => (q[0], q[1], q[3]),
        _ => (q[0], q[1], q[2]),
    };

    // 4. Quantize: [-1/√2, 1/√2] → [0, 1022] (10 bits)
    let quantize = |v: f32| {
        let steps = (v * std::f32::consts::SQRT_2 * QUAT_STEPS).round();
        (steps.clamp(-QUAT_STEPS, QUAT_STEPS) + QUAT_STEPS) as u32
    };

    // 5. Pack: [a:10][b:10][c:10][idx:2]
    (quantize(a) << 22) | (quantize(b) << 12) | (quantize(c) << 2) | (idx as u32)
}

/// Decode a smallest-three encoded quaternion (32 bits)
pub fn decode_quat_smallest_three(packed: u32) -> Quat {
    let idx = (packed & 0x3) as usize;
    let qc = ((packed >> 2) & 0x3FF) as f32;
    let qb = ((packed >> 12) & 0x3FF) as f32;
    let qa = ((packed >> 22) & 0x3FF) as f32;

    // Dequantize: [0, 1022] → [-1/√2, 1/√2]
    let dequantize = |q: f32| (q - QUAT_STEPS) / QUAT_STEPS * std::f32::consts::FRAC_1_SQRT_2;
    let a = dequantize(qa);
    let b = dequantize(qb);
    let c = dequantize(qc);

    // Reconstruct largest component: sqrt(1 - a² - b² - c²)
    let largest = (1.0 - a * a - b * b - c * c).max(0.0).sqrt();

    let components = match idx {
        0 => [largest, a, b, c],
        1 => [a, largest, b, c],
        2 => [a, b, largest, c],
        _ => [a, b, c, largest],
    };
    Quat::from_array(components)
}

// ============================================================================
// Half-Float (f16) Conversion
// ============================================================================

/// Convert f32 to f16 bits
#[inline]
pub fn f32_to_f16(value: f32) -> u16 {
    f16::from_f32(value).to_bits()
}

/// Convert f16 bits to f32
#[inline]
pub fn f16_to_f32(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Quantize a vector to three f16 values
pub fn encode_vec3_f16(value: Vec3) -> [u16; 3] {
    value.to_array().map(f32_to_f16)
}

/// Expand three f16 values back to a vector
pub fn decode_vec3_f16(bits: [u16; 3]) -> Vec3 {
    Vec3::from_array(bits.map(f16_to_f32))
}
