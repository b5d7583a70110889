/// BlazePose の 39 ランドマークインデックス（33 body + 6 auxiliary）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
    /// ROI 位置合わせ用: 体の中心
    AlignCenter = 33,
    /// ROI 位置合わせ用: スケール点
    AlignScale = 34,
    Aux2 = 35,
    Aux3 = 36,
    Aux4 = 37,
    Aux5 = 38,
}

impl LandmarkIndex {
    pub const COUNT: usize = 39;
    /// 補助点を除いた身体ランドマーク数
    pub const BODY_COUNT: usize = 33;

    const ALL: [Self; Self::COUNT] = [
        Self::Nose, Self::LeftEyeInner, Self::LeftEye, Self::LeftEyeOuter,
        Self::RightEyeInner, Self::RightEye, Self::RightEyeOuter, Self::LeftEar,
        Self::RightEar, Self::MouthLeft, Self::MouthRight, Self::LeftShoulder,
        Self::RightShoulder, Self::LeftElbow, Self::RightElbow, Self::LeftWrist,
        Self::RightWrist, Self::LeftPinky, Self::RightPinky, Self::LeftIndex,
        Self::RightIndex, Self::LeftThumb, Self::RightThumb, Self::LeftHip,
        Self::RightHip, Self::LeftKnee, Self::RightKnee, Self::LeftAnkle,
        Self::RightAnkle, Self::LeftHeel, Self::RightHeel, Self::LeftFootIndex,
        Self::RightFootIndex, Self::AlignCenter, Self::AlignScale, Self::Aux2,
        Self::Aux3, Self::Aux4, Self::Aux5,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn is_body(self) -> bool {
        (self as usize) < Self::BODY_COUNT
    }
}

/// 単一ランドマーク
///
/// 座標系は処理段階によって異なる（クロップ正規化座標 → 画像ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// 相対深度（クロップ幅で正規化）
    pub z: f32,
    /// 可視性 (0.0〜1.0)
    pub visibility: f32,
    /// 存在確率 (0.0〜1.0)
    pub presence: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility, presence: 1.0 }
    }

    /// 可視性が閾値以上か
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }
}

pub type Landmarks = [Landmark; LandmarkIndex::COUNT];
