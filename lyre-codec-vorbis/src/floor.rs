// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use lyre_core::errors::{decode_error, Result};
use lyre_core::io::{BitReader, ReadBits};

use super::codebook::Codebook;
use super::common::*;

/// The maximum number of Floor1 posts, including the two end posts.
const FLOOR1_MAX_POSTS: usize = 65;

/// As defined in section 10.1 of the Vorbis I specification.
#[allow(clippy::unreadable_literal)]
#[allow(clippy::excessive_precision)]
#[rustfmt::skip]
const FLOOR1_INVERSE_DB_TABLE: [f32; 256] = [
    1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07,
    1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
    1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.1287530e-07,
    2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
    2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07,
    3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
    4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07,
    6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
    7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
    1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
    1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06,
    1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
    2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06,
    2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
    3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
    4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
    5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06,
    7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
    9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05,
    1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
    1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
    2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
    2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05,
    3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
    4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05,
    5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
    7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
    9.5602426e-05, 0.00010181521, 0.00010843174, 0.00011547824,
    0.00012298267, 0.00013097477, 0.00013948625, 0.00014855085,
    0.00015820453, 0.00016848555, 0.00017943469, 0.00019109536,
    0.00020351382, 0.00021673929, 0.00023082423, 0.00024582449,
    0.00026179955, 0.00027881276, 0.00029693158, 0.00031622787,
    0.00033677814, 0.00035866388, 0.00038197188, 0.00040679456,
    0.00043323036, 0.00046138411, 0.00049136745, 0.00052329927,
    0.00055730621, 0.00059352311, 0.00063209358, 0.00067317058,
    0.00071691700, 0.00076350630, 0.00081312324, 0.00086596457,
    0.00092223983, 0.00098217216, 0.0010459992,  0.0011139742,
    0.0011863665,  0.0012634633,  0.0013455702,  0.0014330129,
    0.0015261382,  0.0016253153,  0.0017309374,  0.0018434235,
    0.0019632195,  0.0020908006,  0.0022266726,  0.0023713743,
    0.0025254795,  0.0026895994,  0.0028643847,  0.0030505286,
    0.0032487691,  0.0034598925,  0.0036847358,  0.0039241906,
    0.0041792066,  0.0044507950,  0.0047400328,  0.0050480668,
    0.0053761186,  0.0057254891,  0.0060975636,  0.0064938176,
    0.0069158225,  0.0073652516,  0.0078438871,  0.0083536271,
    0.0088964928,  0.009474637,   0.010090352,   0.010746080,
    0.011444421,   0.012188144,   0.012980198,   0.013823725,
    0.014722068,   0.015678791,   0.016697687,   0.017782797,
    0.018938423,   0.020169149,   0.021479854,   0.022875735,
    0.024362330,   0.025945531,   0.027631618,   0.029427276,
    0.031339626,   0.033376252,   0.035545228,   0.037855157,
    0.040315199,   0.042935108,   0.045725273,   0.048696758,
    0.051861348,   0.055231591,   0.058820850,   0.062643361,
    0.066714279,   0.071049749,   0.075666962,   0.080584227,
    0.085821044,   0.091398179,   0.097337747,   0.10366330,
    0.11039993,    0.11757434,    0.12521498,    0.13335215,
    0.14201813,    0.15124727,    0.16107617,    0.17154380,
    0.18269168,    0.19456402,    0.20720788,    0.22067342,
    0.23501402,    0.25028656,    0.26655159,    0.28387361,
    0.30232132,    0.32196786,    0.34289114,    0.36517414,
    0.38890521,    0.41417847,    0.44109412,    0.46975890,
    0.50028648,    0.53279791,    0.56742212,    0.60429640,
    0.64356699,    0.68538959,    0.72993007,    0.77736504,
    0.82788260,    0.88168307,    0.9389798,     1.0,
];

/// Per-channel floor state for one packet.
///
/// One `FloorData` is kept per channel and reused for every packet. Floor0 and Floor1 each use
/// only their own fields.
pub struct FloorData {
    /// Floor0 coefficients, stored as `2 * cos(coefficient)`.
    coeffs: [f32; 256],
    /// Floor0 amplitude, pre-scaled by the amplitude offset and divisor.
    amplitude: f32,
    /// Floor1 posts as decoded from the packet.
    posts: [u32; FLOOR1_MAX_POSTS],
    /// Floor1 posts after prediction has been unwrapped.
    final_y: [i32; FLOOR1_MAX_POSTS],
    step2_flag: [bool; FLOOR1_MAX_POSTS],
    post_count: usize,
    has_energy: bool,
    force_energy: bool,
}

impl Default for FloorData {
    fn default() -> Self {
        FloorData {
            coeffs: [0.0; 256],
            amplitude: 0.0,
            posts: [0; FLOOR1_MAX_POSTS],
            final_y: [0; FLOOR1_MAX_POSTS],
            step2_flag: [false; FLOOR1_MAX_POSTS],
            post_count: 0,
            has_energy: false,
            force_energy: false,
        }
    }
}

impl FloorData {
    /// Marks the channel as carrying energy because its coupled partner does.
    pub fn force_energy(&mut self) {
        self.force_energy = true;
    }

    /// Returns `true` if the channel's residue must be decoded.
    pub fn is_executed(&self) -> bool {
        self.has_energy || self.force_energy
    }

    fn clear(&mut self) {
        self.amplitude = 0.0;
        self.post_count = 0;
        self.has_energy = false;
        self.force_energy = false;
    }
}

pub trait Floor: Send + Sync {
    /// Reads the floor for one channel from an audio packet.
    ///
    /// A packet that ends early, or that contains an invalid codeword, leaves the channel with no
    /// energy.
    fn unpack(&self, bs: &mut BitReader<'_>, codebooks: &[Codebook], data: &mut FloorData);

    /// Multiplies `residue`, half a block of spectral coefficients, by the floor curve. A channel
    /// without energy has its residue zeroed.
    fn apply(&self, data: &mut FloorData, is_long: bool, residue: &mut [f32]);
}

pub struct Floor0 {
    order: u8,
    amplitude_bits: u32,
    amplitude_offset: u8,
    books: Vec<u8>,
    /// Bark map for short blocks. Terminated by -1.
    map_short: Vec<i32>,
    /// Bark map for long blocks. Terminated by -1.
    map_long: Vec<i32>,
    /// `2 * cos(omega)` for each Bark band.
    w_map: Vec<f32>,
}

impl Floor0 {
    pub fn try_read(
        bs: &mut BitReader<'_>,
        codebooks: &[Codebook],
        block_sizes: (usize, usize),
    ) -> Result<Box<dyn Floor>> {
        let order = bs.read_bits_leq32(8) as u8;
        let rate = bs.read_bits_leq32(16) as u16;
        let bark_map_size = bs.read_bits_leq32(16) as u16;
        let amplitude_bits = bs.read_bits_leq32(6);
        let amplitude_offset = bs.read_bits_leq32(8) as u8;
        let num_books = bs.read_bits_leq32(4) as usize + 1;

        let mut books = Vec::with_capacity(num_books);

        for _ in 0..num_books {
            let book = bs.read_bits_leq32(8) as u8;

            match codebooks.get(usize::from(book)) {
                Some(codebook) if codebook.has_lookup() => books.push(book),
                Some(_) => return decode_error("vorbis: floor0, codebook has no vq lookup"),
                None => return decode_error("vorbis: floor0, invalid codebook number"),
            }
        }

        if rate == 0 || bark_map_size == 0 {
            return decode_error("vorbis: floor0, invalid rate or bark map size");
        }

        // Pre-compute the Bark-scale maps.
        let map_short = bark_map(block_sizes.0 / 2, rate, bark_map_size);
        let map_long = bark_map(block_sizes.1 / 2, rate, bark_map_size);

        let omega_step = std::f32::consts::PI / f32::from(bark_map_size);

        let w_map = (0..bark_map_size).map(|k| 2.0 * (omega_step * f32::from(k)).cos()).collect();

        Ok(Box::new(Floor0 {
            order,
            amplitude_bits,
            amplitude_offset,
            books,
            map_short,
            map_long,
            w_map,
        }))
    }

    fn unpack_coeffs(
        &self,
        bs: &mut BitReader<'_>,
        codebooks: &[Codebook],
        data: &mut FloorData,
    ) -> Option<()> {
        let book_idx = bs.read_bits_leq32(ilog(self.books.len() as u32)) as usize;

        let codebook = &codebooks[usize::from(*self.books.get(book_idx)?)];

        let order = usize::from(self.order);
        let mut i = 0;
        let mut last = 0.0;

        while i < order {
            let i0 = i;

            let vq = codebook.decode_vq(bs)?;

            // The VQ vector may be longer than the remaining number of coefficients.
            i += (order - i0).min(vq.len());

            // Each vector continues from the last coefficient of the previous one.
            for (c, &vq) in data.coeffs[i0..i].iter_mut().zip(vq) {
                *c = last + vq;
            }

            last = data.coeffs[i - 1];
        }

        if bs.is_short() {
            return None;
        }

        for coeff in data.coeffs[..order].iter_mut() {
            *coeff = 2.0 * coeff.cos();
        }

        Some(())
    }
}

impl Floor for Floor0 {
    fn unpack(&self, bs: &mut BitReader<'_>, codebooks: &[Codebook], data: &mut FloorData) {
        data.clear();

        let amplitude = bs.read_bits_leq64(self.amplitude_bits);

        if amplitude == 0 || bs.is_short() {
            return;
        }

        if self.unpack_coeffs(bs, codebooks, data).is_none() {
            return;
        }

        let amplitude_div = ((1u64 << self.amplitude_bits) - 1) as f32;

        data.amplitude = amplitude as f32 / amplitude_div * f32::from(self.amplitude_offset);
        data.has_energy = data.amplitude > 0.0;
    }

    fn apply(&self, data: &mut FloorData, is_long: bool, residue: &mut [f32]) {
        if !data.has_energy {
            residue.fill(0.0);
            return;
        }

        let map = if is_long { &self.map_long } else { &self.map_short };

        debug_assert!(residue.len() < map.len());

        let n = residue.len().min(map.len() - 1);
        let coeffs = &data.coeffs[..usize::from(self.order)];
        let amplitude_offset = f32::from(self.amplitude_offset);

        let mut i = 0;

        while i < n {
            let k = map[i];
            let w = self.w_map[k as usize];

            let mut p = 0.5;
            let mut q = 0.5;

            let mut iter = coeffs.chunks_exact(2);

            // Coefficients with even indicies contribute to q, and odd indicies to p.
            for pair in &mut iter {
                q *= w - pair[0];
                p *= w - pair[1];
            }

            if let [last] = iter.remainder() {
                q *= w - last;

                p *= p * (4.0 - w * w);
                q *= q;
            }
            else {
                p *= p * (2.0 - w);
                q *= q * (2.0 + w);
            }

            let value = ((data.amplitude / (p + q).sqrt() - amplitude_offset) * 0.11512925).exp();

            // Every bin in the same Bark band shares the value. The map ends with -1.
            loop {
                residue[i] *= value;
                i += 1;

                if i >= n || map[i] != k {
                    break;
                }
            }
        }
    }
}

/// Vorbis I specification, section 6.2.3.
#[inline(always)]
fn bark(x: f64) -> f64 {
    (13.1 * (0.00074 * x).atan()) + (2.24 * (0.0000000185 * x * x).atan()) + (0.0001 * x)
}

/// Computes the Bark band of each of the `n` spectral bins, followed by a -1 terminator.
fn bark_map(n: usize, rate: u16, bark_map_size: u16) -> Vec<i32> {
    let mut map = Vec::with_capacity(n + 1);

    let max_band = i32::from(bark_map_size) - 1;
    let rate = f64::from(rate);
    let rate_by_2n = rate / (2.0 * n as f64);

    let c = f64::from(bark_map_size) / bark(0.5 * rate);

    for i in 0..n {
        let band = (bark(rate_by_2n * i as f64) * c).floor() as i32;
        map.push(band.min(max_band));
    }

    map.push(-1);

    map
}

#[derive(Default)]
struct Floor1Class {
    /// Class dimensions.
    dimensions: u8,
    /// Number of sub-classes expressed as a power-of-2 exponent.
    subclass_bits: u8,
    /// Main codebook index.
    mainbook: u8,
    /// Codebook index for each sub-class, if the sub-class has one.
    subbooks: [Option<u8>; 8],
}

pub struct Floor1 {
    /// Class index associated with each partition.
    partition_classes: Vec<u8>,
    classes: Vec<Floor1Class>,
    /// Floor multiplier, range limited to 1..=4.
    multiplier: u8,
    x_list: Vec<u32>,
    /// Indicies into the x list in order of increasing x.
    sort_order: Vec<u8>,
    /// Low and high neighbours of each post.
    neighbors: Vec<(usize, usize)>,
}

impl Floor1 {
    pub fn try_read(bs: &mut BitReader<'_>, codebooks: &[Codebook]) -> Result<Box<dyn Floor>> {
        let is_valid_book = |book: u8| usize::from(book) < codebooks.len();

        let num_partitions = bs.read_bits_leq32(5) as usize;

        let partition_classes: Vec<u8> =
            (0..num_partitions).map(|_| bs.read_bits_leq32(4) as u8).collect();

        let num_classes = partition_classes.iter().max().map_or(0, |&max| usize::from(max) + 1);

        let mut classes = Vec::with_capacity(num_classes);

        for _ in 0..num_classes {
            let mut class = Floor1Class {
                dimensions: bs.read_bits_leq32(3) as u8 + 1,
                subclass_bits: bs.read_bits_leq32(2) as u8,
                ..Default::default()
            };

            if class.subclass_bits != 0 {
                class.mainbook = bs.read_bits_leq32(8) as u8;

                if !is_valid_book(class.mainbook) {
                    return decode_error("vorbis: floor1, invalid codebook for class");
                }
            }

            for subbook in class.subbooks[..1 << class.subclass_bits].iter_mut() {
                // A codebook number of 0 marks an unused sub-class. Otherwise, the codebook is
                // the number minus one.
                let book = bs.read_bits_leq32(8) as u8;

                if book > 0 {
                    if !is_valid_book(book - 1) {
                        return decode_error("vorbis: floor1, invalid codebook for subclass");
                    }

                    *subbook = Some(book - 1);
                }
            }

            classes.push(class);
        }

        let multiplier = bs.read_bits_leq32(2) as u8 + 1;

        let range_bits = bs.read_bits_leq32(4);

        let mut x_list = vec![0, 1 << range_bits];
        let mut x_list_unique = HashSet::new();

        x_list_unique.insert(0);
        x_list_unique.insert(1 << range_bits);

        for &class_idx in &partition_classes {
            let class = &classes[usize::from(class_idx)];

            if x_list.len() + usize::from(class.dimensions) > FLOOR1_MAX_POSTS {
                return decode_error("vorbis: floor1, x_list too long");
            }

            for _ in 0..class.dimensions {
                let x = bs.read_bits_leq32(range_bits);

                if !x_list_unique.insert(x) {
                    return decode_error("vorbis: floor1, x_list is not unique");
                }

                x_list.push(x);
            }
        }

        let neighbors = (0..x_list.len()).map(|i| find_neighbors(&x_list, i)).collect();

        let mut sort_order: Vec<u8> = (0..x_list.len() as u8).collect();
        sort_order.sort_by_key(|&i| x_list[usize::from(i)]);

        Ok(Box::new(Floor1 {
            partition_classes,
            classes,
            multiplier,
            x_list,
            sort_order,
            neighbors,
        }))
    }

    fn unpack_posts(
        &self,
        bs: &mut BitReader<'_>,
        codebooks: &[Codebook],
        data: &mut FloorData,
    ) -> Option<()> {
        let range = get_range(self.multiplier);
        let range_bits = ilog(range - 1);

        data.posts[0] = bs.read_bits_leq32(range_bits);
        data.posts[1] = bs.read_bits_leq32(range_bits);

        let mut offset = 2;

        for &class_idx in &self.partition_classes {
            let class = &self.classes[usize::from(class_idx)];

            let cdim = usize::from(class.dimensions);
            let cbits = class.subclass_bits;
            let csub = (1 << cbits) - 1;

            let mut cval = 0;

            if cbits > 0 {
                cval = codebooks[usize::from(class.mainbook)].decode_scalar(bs)?;
            }

            for post in data.posts[offset..offset + cdim].iter_mut() {
                let subbook = class.subbooks[(cval & csub) as usize];

                cval >>= cbits;

                *post = match subbook {
                    Some(book) => codebooks[usize::from(book)].decode_scalar(bs)?,
                    None => 0,
                };
            }

            offset += cdim;
        }

        if bs.is_short() {
            return None;
        }

        data.post_count = offset;

        Some(())
    }

    /// Unwraps the decoded posts into absolute Y values, flagging which posts are rendered.
    fn unwrap_posts(&self, data: &mut FloorData) {
        let range = get_range(self.multiplier) as i32;

        data.step2_flag[0] = true;
        data.step2_flag[1] = true;

        data.final_y[0] = data.posts[0] as i32;
        data.final_y[1] = data.posts[1] as i32;

        for i in 2..data.post_count {
            let (low, high) = self.neighbors[i];

            let predicted = render_point(
                self.x_list[low],
                data.final_y[low],
                self.x_list[high],
                data.final_y[high],
                self.x_list[i],
            );

            let val = data.posts[i] as i32;
            let highroom = range - predicted;
            let lowroom = predicted;

            if val != 0 {
                let room = 2 * highroom.min(lowroom);

                data.step2_flag[low] = true;
                data.step2_flag[high] = true;
                data.step2_flag[i] = true;

                data.final_y[i] = if val >= room {
                    if highroom > lowroom {
                        val - lowroom + predicted
                    }
                    else {
                        predicted - val + highroom - 1
                    }
                }
                else if val & 1 == 1 {
                    predicted - ((val + 1) / 2)
                }
                else {
                    predicted + (val / 2)
                };
            }
            else {
                data.step2_flag[i] = false;
                data.final_y[i] = predicted;
            }
        }
    }
}

impl Floor for Floor1 {
    fn unpack(&self, bs: &mut BitReader<'_>, codebooks: &[Codebook], data: &mut FloorData) {
        data.clear();

        // The first bit marks if this floor is used.
        if !bs.read_bool() {
            return;
        }

        if self.unpack_posts(bs, codebooks, data).is_none() {
            data.post_count = 0;
            return;
        }

        data.has_energy = true;
    }

    fn apply(&self, data: &mut FloorData, _is_long: bool, residue: &mut [f32]) {
        if data.post_count == 0 {
            residue.fill(0.0);
            return;
        }

        self.unwrap_posts(data);

        let n = residue.len() as u32;
        let multiplier = i32::from(self.multiplier);

        let mut lx = 0;
        let mut ly = data.final_y[usize::from(self.sort_order[0])] * multiplier;

        for i in self.sort_order[1..data.post_count].iter().map(|&i| usize::from(i)) {
            if lx >= n {
                break;
            }

            if data.step2_flag[i] {
                let hx = self.x_list[i];
                let hy = data.final_y[i] * multiplier;

                render_line(lx, ly, hx, hy, residue);

                lx = hx;
                ly = hy;
            }
        }

        if lx < n {
            render_line(lx, ly, n, ly, residue);
        }
    }
}

#[inline(always)]
fn get_range(multiplier: u8) -> u32 {
    match multiplier {
        1 => 256,
        2 => 128,
        3 => 86,
        _ => 64,
    }
}

/// Finds the low and high neighbours of the post at index `x`, as defined in sections 9.2.4 and
/// 9.2.5 of the Vorbis I specification.
///
/// The low neighbour is the earlier post with the greatest x value less than post `x`'s. The
/// high neighbour is the earlier post with the least x value greater than post `x`'s.
fn find_neighbors(x_list: &[u32], x: usize) -> (usize, usize) {
    let bound = x_list[x];

    let mut low: Option<(usize, u32)> = None;
    let mut high: Option<(usize, u32)> = None;

    for (i, &xv) in x_list[..x].iter().enumerate() {
        if xv < bound && low.map_or(true, |(_, lv)| xv > lv) {
            low = Some((i, xv));
        }

        if xv > bound && high.map_or(true, |(_, hv)| xv < hv) {
            high = Some((i, xv));
        }
    }

    (low.map_or(0, |(i, _)| i), high.map_or(0, |(i, _)| i))
}

#[inline(always)]
fn render_point(x0: u32, y0: i32, x1: u32, y1: i32, x: u32) -> i32 {
    let dy = y1 - y0;
    let adx = x1 - x0;

    if adx == 0 {
        return y0;
    }

    // Posts may be decoded as large entry numbers, so the product can exceed 32 bits.
    let err = u64::from(dy.unsigned_abs()) * u64::from(x - x0);
    let off = (err / u64::from(adx)) as i32;

    if dy < 0 {
        y0 - off
    }
    else {
        y0 + off
    }
}

#[inline(always)]
fn inverse_db(y: i32) -> f32 {
    FLOOR1_INVERSE_DB_TABLE[y.clamp(0, 255) as usize]
}

/// Multiplies `v[x0..x1]` by the inverse dB of the line from `(x0, y0)` to `(x1, y1)`. Points at
/// or beyond the end of `v` are not rendered.
fn render_line(x0: u32, y0: i32, x1: u32, y1: i32, v: &mut [f32]) {
    if x1 <= x0 {
        return;
    }

    let dy = y1 - y0;
    let adx = (x1 - x0) as i32;

    let base = dy / adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };
    let ady = dy.abs() - base.abs() * adx;

    let x_end = v.len().min(x1 as usize);
    let x_begin = x0 as usize;

    if x_begin >= x_end {
        return;
    }

    let mut y = y0;
    let mut err = 0;

    v[x_begin] *= inverse_db(y);

    for v in v[x_begin + 1..x_end].iter_mut() {
        err += ady;

        y += if err >= adx {
            err -= adx;
            sy
        }
        else {
            base
        };

        *v *= inverse_db(y);
    }
}
