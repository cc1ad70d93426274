use qukeys_core::keycodes::*;
use qukeys_core::pipeline::Emitted;
use qukeys_core::script::load_script;
use qukeys_core::{load_config, KeyPosition, Keymap, LogicalKey, Pipeline, QukeysConfig};

// Row-major QWERTY matrix: digits, top row, home row, bottom row.
const ROWS: [&[LogicalKey]; 4] = [
    &[
        KEY_BACKTICK, KEY_1, KEY_2, KEY_3, KEY_4, KEY_5, KEY_6, KEY_7, KEY_8, KEY_9, KEY_0,
        KEY_MINUS,
    ],
    &[
        KEY_TAB, KEY_Q, KEY_W, KEY_E, KEY_R, KEY_T, KEY_Y, KEY_U, KEY_I, KEY_O, KEY_P,
        KEY_BACKSLASH,
    ],
    &[
        KEY_ESCAPE, KEY_A, KEY_S, KEY_D, KEY_F, KEY_G, KEY_H, KEY_J, KEY_K, KEY_L,
        KEY_SEMICOLON, KEY_QUOTE,
    ],
    &[
        KEY_LEFT_SHIFT, KEY_Z, KEY_X, KEY_C, KEY_V, KEY_B, KEY_N, KEY_M, KEY_COMMA, KEY_PERIOD,
        KEY_SLASH, KEY_RIGHT_SHIFT,
    ],
];

fn qwerty() -> Keymap {
    let mut keymap = Keymap::new();
    for (row, keys) in ROWS.iter().enumerate() {
        for (col, key) in keys.iter().enumerate() {
            keymap.set(0, KeyPosition::new(row as u8, col as u8), *key);
        }
    }
    keymap
}

fn describe(key: LogicalKey) -> String {
    match key {
        LogicalKey::LayerShift(layer) => format!("layer{}", layer),
        other => key_name(other)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", other)),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config, script) = match args.as_slice() {
        [script] => (QukeysConfig::default(), script),
        [config, script] => (load_config(config)?, script),
        _ => anyhow::bail!("usage: replay [config.json] <script>"),
    };

    let steps = load_script(script)?;
    let engine = config.build_engine()?;
    let mut pipeline: Pipeline = Pipeline::new(qwerty(), engine);
    pipeline.set_on_emit(|e: &Emitted| {
        println!(
            "{:>6} ms  {:?} {:>5}  {},{}  id={}",
            e.time,
            e.event.edge,
            describe(e.event.key),
            e.event.position.row,
            e.event.position.col,
            e.event.id
        );
    });
    pipeline.run_script(&steps);

    if pipeline.engine().queue_len() > 0 {
        println!(
            "{} events still queued at {} ms",
            pipeline.engine().queue_len(),
            pipeline.now()
        );
    }
    Ok(())
}
