use serde::Serialize;
use std::collections::BTreeSet;

/// A set of class labels, used as a filter allow-list or an alert watch-list.
///
/// Labels are stored trimmed; empty labels are dropped on insertion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClassSet(BTreeSet<String>);

impl ClassSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated list, e.g. `"person, car,dog"`.
    pub fn parse_csv(value: &str) -> Self {
        value.split(',').collect()
    }

    pub fn insert(&mut self, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() {
            return false;
        }
        self.0.insert(label.to_string())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for ClassSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ClassSet::new();
        for label in iter {
            set.insert(label.as_ref());
        }
        set
    }
}

/// Labels emitted by COCO-trained detectors such as YOLOv8, in class-id order.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_csv_trims_and_drops_empties() {
        let set = ClassSet::parse_csv(" person, car ,,dog ");
        assert_eq!(set.len(), 3);
        assert!(set.contains("car"));
        assert!(!set.contains(" car "));
    }

    #[test]
    fn default_watch_choices_are_coco_labels() {
        for label in ["person", "car", "truck", "dog", "cat", "bicycle"] {
            assert!(COCO_CLASSES.contains(&label));
        }
    }
}
