//! Fractal noise used to perturb cutting surfaces
//!
//! Improved Perlin gradient noise summed over octaves. Every sample is a
//! pure function of position and seed, so the same seed reproduces the
//! same jagged fracture surface.

use glam::Vec3;

/// Parameters of a fractal displacement field
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FractalNoise {
    /// Displacement scale; the field stays within `[-amplitude, amplitude]`
    pub amplitude: f32,
    /// Base frequency of the first octave
    pub frequency: f32,
    /// Number of octaves, at least 1
    pub octaves: u32,
    pub seed: i32,
}

impl FractalNoise {
    pub fn new(amplitude: f32, frequency: f32, octaves: u32, seed: i32) -> Self {
        Self {
            amplitude,
            frequency,
            octaves: octaves.max(1),
            seed,
        }
    }

    /// Displacement at `position`
    pub fn sample(&self, position: Vec3) -> f32 {
        self.amplitude * fbm(position * self.frequency, self.seed as u32, self.octaves, 0.5, 2.0)
    }
}

// Ken Perlin's reference permutation; changing it changes every fracture pattern.
const PERM: [u32; 256] = [
    151, 160, 137, 91, 90, 15, 131, 13, 201, 95, 96, 53, 194, 233, 7, 225, 140, 36, 103, 30, 69,
    142, 8, 99, 37, 240, 21, 10, 23, 190, 6, 148, 247, 120, 234, 75, 0, 26, 197, 62, 94, 252, 219,
    203, 117, 35, 11, 32, 57, 177, 33, 88, 237, 149, 56, 87, 174, 20, 125, 136, 171, 168, 68, 175,
    74, 165, 71, 134, 139, 48, 27, 166, 77, 146, 158, 231, 83, 111, 229, 122, 60, 211, 133, 230,
    220, 105, 92, 41, 55, 46, 245, 40, 244, 102, 143, 54, 65, 25, 63, 161, 1, 216, 80, 73, 209, 76,
    132, 187, 208, 89, 18, 169, 200, 196, 135, 130, 116, 188, 159, 86, 164, 100, 109, 198, 173,
    186, 3, 64, 52, 217, 226, 250, 124, 123, 5, 202, 38, 147, 118, 126, 255, 82, 85, 212, 207, 206,
    59, 227, 47, 16, 58, 17, 182, 189, 28, 42, 223, 183, 170, 213, 119, 248, 152, 2, 44, 154, 163,
    70, 221, 153, 101, 155, 167, 43, 172, 9, 129, 22, 39, 253, 19, 98, 108, 110, 79, 113, 224, 232,
    178, 185, 112, 104, 218, 246, 97, 228, 251, 34, 242, 193, 238, 210, 144, 12, 191, 179, 162,
    241, 81, 51, 145, 235, 249, 14, 239, 107, 49, 192, 214, 31, 181, 199, 106, 157, 184, 84, 204,
    176, 115, 121, 50, 45, 127, 4, 150, 254, 138, 236, 205, 93, 222, 114, 67, 29, 24, 72, 243, 141,
    128, 195, 78, 66, 215, 61, 156, 180,
];

#[inline]
fn corner_hash(x: i32, y: i32, z: i32, seed: u32) -> u32 {
    let s = seed.wrapping_mul(1103515245).wrapping_add(12345) >> 16;
    let ix = ((x as u32) ^ s) & 255;
    let iy = ((y as u32) ^ (s >> 8)) & 255;
    let iz = ((z as u32) ^ (s >> 16)) & 255;
    let a = PERM[ix as usize];
    let b = PERM[((a + iy) & 255) as usize];
    PERM[((b + iz) & 255) as usize]
}

/// Dot product with one of the 12 cube-edge gradients picked by `h`
#[inline]
fn grad(h: u32, d: Vec3) -> f32 {
    let h = h & 15;
    let u = if h < 8 { d.x } else { d.y };
    let v = if h < 4 {
        d.y
    } else if h == 12 || h == 14 {
        d.z
    } else {
        d.x
    };
    let u = if h & 1 == 0 { -u } else { u };
    let v = if h & 2 == 0 { -v } else { v };
    u + v
}

/// 6t⁵ - 15t⁴ + 10t³
#[inline]
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}

/// Single-octave gradient noise in [-1, 1]
fn gradient_noise(pos: Vec3, seed: u32) -> f32 {
    let cell = pos.floor();
    let (x0, y0, z0) = (cell.x as i32, cell.y as i32, cell.z as i32);
    let f = pos - cell;
    let (u, v, w) = (fade(f.x), fade(f.y), fade(f.z));

    let corner = |dx: i32, dy: i32, dz: i32| {
        let h = corner_hash(x0 + dx, y0 + dy, z0 + dz, seed);
        grad(h, f - Vec3::new(dx as f32, dy as f32, dz as f32))
    };

    let x00 = mix(corner(0, 0, 0), corner(1, 0, 0), u);
    let x10 = mix(corner(0, 1, 0), corner(1, 1, 0), u);
    let x01 = mix(corner(0, 0, 1), corner(1, 0, 1), u);
    let x11 = mix(corner(0, 1, 1), corner(1, 1, 1), u);
    mix(mix(x00, x10, v), mix(x01, x11, v), w)
}

/// Fractal Brownian motion normalized to roughly [-1, 1]
pub fn fbm(position: Vec3, seed: u32, octaves: u32, persistence: f32, lacunarity: f32) -> f32 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut norm = 0.0;
    for octave in 0..octaves.max(1) {
        // decorrelate octaves so lattice points do not line up
        let octave_seed = seed.wrapping_add(octave.wrapping_mul(7919));
        total += gradient_noise(position * frequency, octave_seed) * amplitude;
        norm += amplitude;
        amplitude *= persistence;
        frequency *= lacunarity;
    }
    total / norm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_is_deterministic() {
        let noise = FractalNoise::new(0.5, 2.0, 4, 17);
        let p = Vec3::new(0.31, -0.72, 0.05);
        assert_eq!(noise.sample(p), noise.sample(p));
    }

    #[test]
    fn test_noise_respects_amplitude() {
        let noise = FractalNoise::new(0.25, 3.0, 3, 5);
        for i in 0..200 {
            let t = i as f32 * 0.137;
            let p = Vec3::new(t.sin() * 3.0, t.cos() * 2.0, t * 0.1);
            let v = noise.sample(p);
            assert!(v.abs() <= 0.25 * 1.1, "sample {} out of range", v);
        }
    }

    #[test]
    fn test_noise_vanishes_on_lattice() {
        // gradient noise is zero at integer lattice points
        let v = gradient_noise(Vec3::new(3.0, -2.0, 7.0), 99);
        assert!(v.abs() < 1e-6);
    }

    #[test]
    fn test_seeds_differ() {
        let p = Vec3::new(0.4, 0.6, 0.2);
        let a = fbm(p, 1, 3, 0.5, 2.0);
        let b = fbm(p, 2, 3, 0.5, 2.0);
        assert_ne!(a, b);
    }
}
