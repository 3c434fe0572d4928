use calmform::FormModel;

#[derive(FormModel)]
struct Pair(String, u32);

fn main() {
    let pair = Pair(String::new(), 0);
    let _ = (pair.0, pair.1);
}
