pub mod preprocessing;

pub use preprocessing::{
    decode_image_bytes, letterbox, letterbox_geometry, load_image, normalize_chw, preprocess,
    ImagePreprocessor, LetterboxGeometry, PreprocessedImage, IMAGENET_MEAN, IMAGENET_STD,
};
