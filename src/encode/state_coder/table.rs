// src/encode/state_coder/table.rs

//! Immutable tables of the 64-state probability machine.

/// Number of usable probability states. State 63 is the terminating state
/// and never reached by adaptation.
pub const STATE_COUNT: usize = 63;

/// Width of the least-probable-symbol subrange, indexed by
/// `[state][(range >> 6) & 3]`.
#[rustfmt::skip]
pub const LPS_TABLE: [[u8; 4]; 64] = [
    [128, 176, 208, 240], [128, 167, 197, 227], [128, 158, 187, 216], [123, 150, 178, 205],
    [116, 142, 169, 195], [111, 135, 160, 185], [105, 128, 152, 175], [100, 122, 144, 166],
    [95, 116, 137, 158], [90, 110, 130, 150], [85, 104, 123, 142], [81, 99, 117, 135],
    [77, 94, 111, 128], [73, 89, 105, 122], [69, 85, 100, 116], [66, 80, 95, 110],
    [62, 76, 90, 104], [59, 72, 86, 99], [56, 69, 81, 94], [53, 65, 77, 89],
    [51, 62, 73, 85], [48, 59, 69, 80], [46, 56, 66, 76], [43, 53, 63, 72],
    [41, 50, 59, 69], [39, 48, 56, 65], [37, 45, 54, 62], [35, 43, 51, 59],
    [33, 41, 48, 56], [32, 39, 46, 53], [30, 37, 43, 50], [29, 35, 41, 48],
    [27, 33, 39, 45], [26, 31, 37, 43], [24, 30, 35, 41], [23, 28, 33, 39],
    [22, 27, 32, 37], [21, 26, 30, 35], [20, 24, 29, 33], [19, 23, 27, 31],
    [18, 22, 26, 30], [17, 21, 25, 28], [16, 20, 23, 27], [15, 19, 22, 25],
    [14, 18, 21, 24], [14, 17, 20, 23], [13, 16, 19, 22], [12, 15, 18, 21],
    [12, 14, 17, 20], [11, 14, 16, 19], [11, 13, 15, 18], [10, 12, 15, 17],
    [10, 12, 14, 16], [9, 11, 13, 15], [9, 11, 12, 14], [8, 10, 12, 14],
    [8, 9, 11, 13], [7, 9, 11, 12], [7, 9, 10, 12], [7, 8, 10, 11],
    [6, 8, 9, 11], [6, 7, 9, 10], [6, 7, 8, 9], [2, 2, 2, 2],
];

/// Next state after coding the most probable symbol.
#[rustfmt::skip]
pub const NEXT_STATE_MPS: [u8; 64] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16,
    17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32,
    33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48,
    49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 62, 63,
];

/// Next state after coding the least probable symbol.
#[rustfmt::skip]
pub const NEXT_STATE_LPS: [u8; 64] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12,
    13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21, 21, 22, 22, 23, 24,
    24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33,
    33, 33, 34, 34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

/// Left shift needed to bring an LPS subrange back above 256, indexed by
/// `lps >> 3`.
#[rustfmt::skip]
pub const RENORM_TABLE: [u8; 32] = [
    6, 5, 4, 4, 3, 3, 3, 3,
    2, 2, 2, 2, 2, 2, 2, 2,
    1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1,
];

/// LPS probability, scaled by `2^32`, at the geometric midpoint between
/// state `s` and state `s + 1`. State `s` models `0.5 * alpha^s` with
/// `alpha = (0.01875 / 0.5)^(1/63)`; a probability at or below entry `s`
/// belongs to a state above `s`.
#[rustfmt::skip]
pub const STATE_THRESHOLDS: [u32; STATE_COUNT - 1] = [
    2092245552, 1985995358, 1885140851, 1789408023, 1698536782, 1612280241,
    1530404054, 1452685772, 1378914247, 1308889050, 1242419932, 1179326305,
    1119436753, 1062588563, 1008627286, 957406316, 908786494, 862635724,
    818828623, 777246171, 737775394, 700309056, 664745365, 630987700,
    598944346, 568528244, 539656759, 512251450, 486237861, 461545316,
    438106729, 415858420, 394739943, 374693924, 355665898, 337604169,
    320459667, 304185811, 288738389, 274075430, 260157098, 246945579,
    234404978, 222501225, 211201978, 200476540, 190295769, 180632008,
    171458999, 162751822, 154486821, 146641540, 139194664, 132125962,
    125416229, 119047235, 113001677, 107263130, 101816002, 96645495,
    91737561, 87078867,
];
