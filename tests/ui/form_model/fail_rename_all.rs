use calmform::FormModel;

#[derive(FormModel)]
#[serde(rename_all = "shouty")]
struct Signup {
    email: String,
}

fn main() {
    let signup = Signup {
        email: String::new(),
    };
    let _ = signup.email;
}
