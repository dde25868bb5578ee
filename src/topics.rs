//! Fixed conversation-topic catalog for the pairing space: 22 themes, each
//! with 3 prompt cards rotated client-side. The catalog itself never
//! changes at runtime; which theme a pair talks about is derived from the
//! message log (see `ConversationRepo::conversation_theme`), never stored
//! here.

use rand::seq::SliceRandom;

pub const PROMPTS_PER_THEME: usize = 3;
pub const SAMPLE_SIZE: usize = 4;

pub const CATALOG: &[(&str, [&str; PROMPTS_PER_THEME])] = &[
    ("猫", ["猫派？犬派？", "飼ってる猫の名前は？", "猫の仕草で好きなものは？"]),
    ("ゲーム", ["最近ハマってるゲームは？", "感動した瞬間は？", "推しキャラは？"]),
    ("旅行", ["最近行った場所は？", "旅先での思い出は？", "理想の旅って？"]),
    ("音楽", ["よく聴くジャンルは？", "好きなアーティストは？", "音楽で救われた瞬間ある？"]),
    ("映画", ["最近観た映画は？", "泣いた映画ある？", "推し俳優は？"]),
    ("本", ["好きな作家は？", "人生変えた一冊ある？", "読書ってどんな時にする？"]),
    ("カフェ", ["お気に入りのカフェある？", "コーヒー派？紅茶派？", "理想のカフェ空間って？"]),
    ("学校", ["得意だった科目は？", "部活何してた？", "学校での思い出ある？"]),
    ("仕事", ["今どんな仕事してる？", "やりがい感じる瞬間は？", "理想の働き方って？"]),
    ("推し活", ["推しは誰？", "推しのどこが好き？", "推しに救われたことある？"]),
    ("SNS", ["よく使うSNSは？", "SNSで嬉しかったことある？", "SNSとの距離感どうしてる？"]),
    ("料理", ["得意料理ある？", "最近作ったものは？", "食べる専門？作る派？"]),
    ("天気", ["雨の日どう過ごす？", "好きな季節は？", "天気で気分変わるタイプ？"]),
    ("ファッション", ["服選びのこだわりある？", "好きな色は？", "最近買った服ある？"]),
    ("趣味", ["最近の趣味は？", "昔ハマってたことある？", "趣味って人生に必要？"]),
    ("睡眠", ["寝るの得意？", "理想の睡眠時間は？", "寝る前にすることある？"]),
    ("朝", ["朝型？夜型？", "朝のルーティンある？", "朝ごはん食べる派？"]),
    ("夜", ["夜ってどんな気分？", "夜に聴きたい音楽ある？", "夜更かしするタイプ？"]),
    ("ペット", ["飼ってるペットいる？", "ペットとの思い出ある？", "理想のペットは？"]),
    ("アート", ["好きな画家いる？", "美術館行く？", "自分で描いたことある？"]),
    ("スポーツ", ["観る派？やる派？", "好きなスポーツは？", "運動得意？"]),
    ("言葉", ["好きな言葉ある？", "座右の銘ってある？", "言葉に救われたことある？"]),
];

pub fn is_theme(theme: &str) -> bool {
    CATALOG.iter().any(|(name, _)| *name == theme)
}

pub fn prompts(theme: &str) -> Option<&'static [&'static str; PROMPTS_PER_THEME]> {
    CATALOG
        .iter()
        .find(|(name, _)| *name == theme)
        .map(|(_, cards)| cards)
}

/// Prompt card at a rotating index; any index is accepted and wraps modulo
/// the card count, since the index itself is ephemeral session state.
pub fn prompt_at(theme: &str, index: usize) -> Option<&'static str> {
    prompts(theme).map(|cards| cards[index % PROMPTS_PER_THEME])
}

/// Draw `n` distinct themes without replacement, offered to the initiating
/// user of an unthemed conversation.
pub fn sample(n: usize) -> Vec<&'static str> {
    let mut rng = rand::thread_rng();
    CATALOG
        .choose_multiple(&mut rng, n)
        .map(|(name, _)| *name)
        .collect()
}
