use calmform::FormModel;

#[derive(FormModel)]
struct Draft<T> {
    value: T,
}

fn main() {
    let draft = Draft { value: 1 };
    let _ = draft.value;
}
