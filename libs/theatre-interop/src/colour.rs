// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Colour description used to configure sampling and colour conversion.

/// YCbCr → RGB matrix coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColourMatrix {
    Bt601,
    #[default]
    Bt709,
    Bt2020,
    Smpte240m,
}

impl ColourMatrix {
    /// Luma weights (Kr, Kb).
    pub fn coefficients(&self) -> (f32, f32) {
        match self {
            Self::Bt601 => (0.299, 0.114),
            Self::Bt709 => (0.2126, 0.0722),
            Self::Bt2020 => (0.2627, 0.0593),
            Self::Smpte240m => (0.212, 0.087),
        }
    }
}

/// Quantisation range of the decoded samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColourRange {
    /// 16–235 luma, 16–240 chroma.
    #[default]
    Limited,
    /// 0–255.
    Full,
}

/// 3×4 row-major conversion applied to (Y, Cb, Cr, 1), the layout VDPAU
/// and the GL shaders both consume.
pub type CscMatrix = [[f32; 4]; 3];

/// Colour transform requested by the renderer for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColourSpace {
    pub matrix: ColourMatrix,
    pub range: ColourRange,
}

impl ColourSpace {
    pub fn new(matrix: ColourMatrix, range: ColourRange) -> Self {
        Self { matrix, range }
    }

    /// YCbCr → RGB matrix for normalised inputs in `[0, 1]`.
    pub fn csc_matrix(&self) -> CscMatrix {
        let (kr, kb) = self.matrix.coefficients();
        let kg = 1.0 - kr - kb;

        let (luma_scale, chroma_scale, luma_offset) = match self.range {
            ColourRange::Limited => (255.0 / 219.0, 255.0 / 224.0, 16.0 / 255.0),
            ColourRange::Full => (1.0, 1.0, 0.0),
        };
        let chroma_offset = 128.0 / 255.0;

        let r_cr = chroma_scale * 2.0 * (1.0 - kr);
        let g_cb = -chroma_scale * 2.0 * kb * (1.0 - kb) / kg;
        let g_cr = -chroma_scale * 2.0 * kr * (1.0 - kr) / kg;
        let b_cb = chroma_scale * 2.0 * (1.0 - kb);

        let y_bias = -luma_scale * luma_offset;
        [
            [luma_scale, 0.0, r_cr, y_bias - r_cr * chroma_offset],
            [
                luma_scale,
                g_cb,
                g_cr,
                y_bias - (g_cb + g_cr) * chroma_offset,
            ],
            [luma_scale, b_cb, 0.0, y_bias - b_cb * chroma_offset],
        ]
    }
}
